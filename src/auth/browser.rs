use crate::error::{RelayError, Result};

/// Hands the authorization URL to whatever shows it to the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Opens the system browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        webbrowser::open(url).map_err(RelayError::Io)
    }
}

/// Prints the URL to stderr for headless machines.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintUrl;

impl BrowserLauncher for PrintUrl {
    fn open(&self, url: &str) -> Result<()> {
        eprintln!("Open this URL to authorize:\n  {url}");
        Ok(())
    }
}
