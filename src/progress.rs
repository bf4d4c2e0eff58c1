use indicatif::{ProgressBar, ProgressStyle};

/// Per-batch document progress.
pub struct ProgressTracker {
    bar: ProgressBar,
}

impl ProgressTracker {
    pub fn new(total: usize, label: &str, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(format!("{}: starting", label));

        Self { bar }
    }

    pub fn start_document(&self, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    pub fn increment(&self) {
        self.bar.inc(1);
    }

    /// Print a line above the bar without corrupting it.
    pub fn println(&self, line: &str) {
        if self.bar.is_hidden() {
            return;
        }
        self.bar.println(line);
    }

    pub fn finish(&self, succeeded: usize, failed: usize) {
        self.bar
            .finish_with_message(format!("done: {} ok, {} failed", succeeded, failed));
    }
}
