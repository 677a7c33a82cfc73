use crate::TransferError;

/// Allow-list of file types accepted for upload.
///
/// Entries take three forms: `.pdf` and `pdf` match the extension
/// (case-insensitive), `image/png` matches the MIME type guessed from the
/// extension, and `image/*` matches any subtype. An optional size cap rejects
/// larger files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTypeFilter {
    allowed: Vec<String>,
    max_size: Option<u64>,
}

impl FileTypeFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(Into::into)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_size: None,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Parses a comma-separated list such as `pdf,.docx,image/*`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// An empty filter allows everything.
    pub fn allows(&self, file_name: &str) -> bool {
        if self.allowed.is_empty() {
            return true;
        }

        let extension = file_extension(file_name).to_ascii_lowercase();
        let mime = guess_mime(&extension);

        self.allowed.iter().any(|entry| {
            if let Some(ext) = entry.strip_prefix('.') {
                ext.eq_ignore_ascii_case(&extension)
            } else if let Some((top, sub)) = entry.split_once('/') {
                match mime.and_then(|m| m.split_once('/')) {
                    Some((mime_top, _)) if sub == "*" => mime_top.eq_ignore_ascii_case(top),
                    Some(_) => mime.is_some_and(|m| m.eq_ignore_ascii_case(entry)),
                    None => false,
                }
            } else {
                entry.eq_ignore_ascii_case(&extension)
            }
        })
    }
}

/// Checks a file before any server contact.
///
/// Rejects empty names and names containing path separators. With a filter,
/// also rejects types outside its allow-list and sizes above its cap. A size
/// of 0 is valid: an empty file uploads trivially.
pub fn validate_upload_file(
    file_name: &str,
    size: u64,
    filter: Option<&FileTypeFilter>,
) -> Result<(), TransferError> {
    if file_name.trim().is_empty() {
        return Err(TransferError::InvalidFile("empty file name".into()));
    }

    if file_name.contains(['/', '\\']) {
        return Err(TransferError::InvalidFile(format!(
            "file name must not contain path separators: {file_name}"
        )));
    }

    if file_name == "." || file_name == ".." {
        return Err(TransferError::InvalidFile(format!(
            "invalid file name: {file_name}"
        )));
    }

    if let Some(filter) = filter {
        if !filter.allows(file_name) {
            return Err(TransferError::InvalidFile(format!(
                "file type not allowed: {file_name}"
            )));
        }
        if let Some(max) = filter.max_size.filter(|&max| size > max) {
            return Err(TransferError::InvalidFile(format!(
                "file too large: {} exceeds {}",
                format_file_size(size),
                format_file_size(max)
            )));
        }
    }

    Ok(())
}

/// Renders a byte count as `B`, `KB`, `MB`, `GB` or `TB` with up to two
/// decimals, using 1024 as the base.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".into();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{rounded:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}

fn file_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => "",
    }
}

fn guess_mime(extension: &str) -> Option<&'static str> {
    let mime = match extension {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}
