use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Pdf,
    Document,
    Code,
    Text,
    Other,
}

/// Classify a file name by its extension (case-insensitive).
pub fn resolve_file_type(name: &str) -> FileCategory {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return FileCategory::Other;
    };
    // ".bashrc" has no extension
    if stem.is_empty() {
        return FileCategory::Other;
    }
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" | "ico" => FileCategory::Image,
        "pdf" => FileCategory::Pdf,
        "doc" | "docx" | "rtf" | "odt" => FileCategory::Document,
        "txt" | "md" | "csv" => FileCategory::Text,
        "js" | "html" | "css" | "json" | "xml" | "py" | "java" | "cpp" | "c" | "php" | "rb"
        | "go" | "rs" | "ts" | "toml" | "yaml" | "yml" | "sh" => FileCategory::Code,
        _ => FileCategory::Other,
    }
}
