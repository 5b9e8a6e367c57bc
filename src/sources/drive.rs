use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Dominios de Google Drive que aceptan enlaces compartidos.
const DRIVE_HOSTS: &[&str] = &["drive.google.com", "drive.usercontent.google.com"];

fn file_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{20,}$").expect("regex de file id válida"))
}

fn share_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/file/d/([^/]+)").expect("regex de ruta válida"))
}

/// Convierte lo que escribe el usuario en una URL descargable.
///
/// Es puramente sintáctico: no hace llamadas de red y nunca falla, una entrada
/// mal formada simplemente no se resuelve.
#[derive(Debug, Clone, Default)]
pub struct MediaResolver {
    api_key: Option<String>,
}

impl MediaResolver {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    /// Resuelve un file id de Drive, un enlace compartido o una URL http(s) directa.
    pub fn resolve(&self, input: &str) -> Option<String> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if file_id_pattern().is_match(input) {
            return Some(self.download_url(input));
        }

        let url = match Url::parse(input) {
            Ok(url) => url,
            Err(e) => {
                debug!("Entrada no es una URL ({}): {}", e, input);
                return None;
            }
        };

        if let Some(file_id) = drive_file_id(&url) {
            return Some(self.download_url(&file_id));
        }

        let is_http = matches!(url.scheme(), "http" | "https");
        if is_http && url.host_str().is_some() {
            return Some(input.to_string());
        }

        None
    }

    /// Con API key usa el endpoint autenticado; si no, el de usercontent.
    fn download_url(&self, file_id: &str) -> String {
        match &self.api_key {
            Some(key) => format!(
                "https://www.googleapis.com/drive/v3/files/{}?alt=media&key={}",
                file_id,
                urlencoding::encode(key)
            ),
            None => format!(
                "https://drive.usercontent.google.com/uc?id={}&export=download",
                file_id
            ),
        }
    }
}

/// Extrae el id de `/file/d/{id}` o del parámetro `id=` en hosts de Drive.
fn drive_file_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if !DRIVE_HOSTS.contains(&host) {
        return None;
    }

    if let Some(captures) = share_path_pattern().captures(url.path()) {
        return captures.get(1).map(|m| m.as_str().to_string());
    }

    url.query_pairs()
        .find(|(key, value)| key == "id" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
