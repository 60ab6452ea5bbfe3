/// A resource path split into its directory prefix and trailing file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPath {
    /// Everything up to and including the last `/`, or empty.
    pub base_path: String,
    pub file_name: String,
    pub original: String,
}

impl AssetPath {
    pub fn parse(path: &str) -> Self {
        let split = path.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (base_path, file_name) = path.split_at(split);

        Self {
            base_path: base_path.to_string(),
            file_name: file_name.to_string(),
            original: path.to_string(),
        }
    }

    /// Resolves a path referenced from inside this asset (an `mtllib`, a
    /// glTF buffer uri) against this asset's directory.
    pub fn sibling(&self, relative: &str) -> String {
        if relative.contains("://") || relative.starts_with('/') {
            relative.to_string()
        } else {
            format!("{}{}", self.base_path, relative)
        }
    }

    /// File name without its extension, used to name decoded objects.
    pub fn stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(0) | None => &self.file_name,
            Some(i) => &self.file_name[..i],
        }
    }
}
