use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".webpilot"))
            .unwrap_or_else(|| PathBuf::from(".webpilot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Browser user-data directories, one per launched instance.
    pub fn browser_dir(&self) -> PathBuf {
        self.base.join("browser")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
