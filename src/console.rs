use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Color of a bracketed status token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Good,
    Warn,
    Bad,
}

/// User-facing progress output. Cloning shares the same writer.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    styled: bool,
}

/// In-memory capture of everything a buffered console printed.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Console {
    pub fn stdout() -> Self {
        Self { out: Arc::new(Mutex::new(Box::new(std::io::stdout()))), styled: true }
    }

    /// Unstyled console writing into memory.
    pub fn buffer() -> (Self, Captured) {
        let captured = Captured::default();
        let console = Self { out: Arc::new(Mutex::new(Box::new(captured.clone()))), styled: false };
        (console, captured)
    }

    pub fn print(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed stdout is not worth failing an operation over.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    pub fn line(&self, text: &str) {
        self.print(&format!("{text}\n"));
    }

    /// Fixed-width operation label, left open for the status token.
    pub fn label(&self, name: &str) {
        self.print(&format!("{:<50}", format!("{name}...")));
    }

    /// `[message]` in the color of `tone`, ending the line.
    pub fn token(&self, message: &str, tone: Tone) {
        let message = if self.styled {
            let style = match tone {
                Tone::Good => ::console::Style::new().green(),
                Tone::Warn => ::console::Style::new().yellow(),
                Tone::Bad => ::console::Style::new().red(),
            };
            style.apply_to(message).to_string()
        } else {
            message.to_string()
        };
        self.print(&format!("[{message}]\n"));
    }
}
