//! Colored terminal output for command progress and results.
//!
//! Results go to stdout so they can be piped; progress, warnings and
//! verbose detail go to stderr. Color is decided per stream.

use clap::ValueEnum;
use console::{Style, Term};
use std::io;

/// When to color terminal output
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorChoice {
    /// Color when the stream is a color-capable terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl ColorChoice {
    fn enabled_for(self, term: &Term) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => term.features().colors_supported(),
        }
    }
}

/// Writes user-facing messages honoring the verbose and quiet switches.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
    stdout: Term,
    stderr: Term,
    stdout_colors: bool,
    stderr_colors: bool,
}

impl OutputManager {
    /// Create a new output manager
    pub fn new(verbose: bool, quiet: bool, color: ColorChoice) -> Self {
        let stdout = Term::stdout();
        let stderr = Term::stderr();
        Self {
            verbose,
            quiet,
            stdout_colors: color.enabled_for(&stdout),
            stderr_colors: color.enabled_for(&stderr),
            stdout,
            stderr,
        }
    }

    /// Whether verbose output is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    fn out_style(&self, style: Style) -> Style {
        style.force_styling(self.stdout_colors)
    }

    fn err_style(&self, style: Style) -> Style {
        style.for_stderr().force_styling(self.stderr_colors)
    }

    /// Print a detail line in verbose mode only
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if self.is_verbose() {
            let dim = self.err_style(Style::new().dim());
            self.stderr
                .write_line(&format!("  {}", dim.apply_to(message)))?;
        }
        Ok(())
    }

    /// Print a progress step
    pub fn progress(&self, message: &str) -> io::Result<()> {
        if !self.quiet {
            let arrow = self.err_style(Style::new().cyan().bold());
            self.stderr
                .write_line(&format!("{} {message}", arrow.apply_to("→")))?;
        }
        Ok(())
    }

    /// Print a warning; shown even in quiet mode
    pub fn warn(&self, message: &str) -> io::Result<()> {
        let label = self.err_style(Style::new().yellow().bold());
        self.stderr
            .write_line(&format!("{} {message}", label.apply_to("warning:")))
    }

    /// Print a success message
    pub fn success(&self, message: &str) -> io::Result<()> {
        if !self.quiet {
            let check = self.out_style(Style::new().green().bold());
            self.stdout
                .write_line(&format!("{} {message}", check.apply_to("✓")))?;
        }
        Ok(())
    }

    /// Print a section header
    pub fn section(&self, title: &str) -> io::Result<()> {
        if !self.quiet {
            let heading = self.out_style(Style::new().bold().underlined());
            self.stdout
                .write_line(&heading.apply_to(title).to_string())?;
        }
        Ok(())
    }

    /// Print an indented result line; shown even in quiet mode
    pub fn indent(&self, message: &str) -> io::Result<()> {
        self.stdout.write_line(&format!("  {message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_choice_overrides_detection() {
        let never = OutputManager::new(false, false, ColorChoice::Never);
        assert!(!never.stdout_colors && !never.stderr_colors);
        let plain = never.out_style(Style::new().green()).apply_to("ok").to_string();
        assert_eq!(plain, "ok");

        let always = OutputManager::new(false, false, ColorChoice::Always);
        let colored = always.out_style(Style::new().green()).apply_to("ok").to_string();
        assert!(colored.contains("\u{1b}["));
        assert!(colored.contains("ok"));
    }

    #[test]
    fn quiet_silences_verbose() {
        assert!(OutputManager::new(true, false, ColorChoice::Never).is_verbose());
        assert!(!OutputManager::new(true, true, ColorChoice::Never).is_verbose());
    }
}
