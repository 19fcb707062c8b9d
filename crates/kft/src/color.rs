//! Terminal coloring of diagnostics.
//!
//! Styles come from the [colored](https://docs.rs/colored/latest/colored/) crate when the
//!     `color` Cargo feature is on (the default).
//! Without the feature [Colorize] leaves text unstyled, so callers never need a `cfg`:
//!
//! ```
//! use kft::color::Colorize;
//! eprintln!["{}", "error".bold().bright_red()];
//! ```

/// Styled text; a plain string when the `color` feature is off.
#[cfg(feature = "color")]
pub type ColoredString = colored::ColoredString;

#[cfg(not(feature = "color"))]
pub type ColoredString = &'static str;

/// The styles kft uses in diagnostics.
pub trait Colorize: Sized {
    fn bold(self) -> ColoredString;
    fn bright_cyan(self) -> ColoredString;
    fn bright_red(self) -> ColoredString;
}

#[cfg(feature = "color")]
impl<T: colored::Colorize> Colorize for T {
    fn bold(self) -> ColoredString {
        colored::Colorize::bold(self)
    }

    fn bright_cyan(self) -> ColoredString {
        colored::Colorize::bright_cyan(self)
    }

    fn bright_red(self) -> ColoredString {
        colored::Colorize::bright_red(self)
    }
}

#[cfg(not(feature = "color"))]
impl Colorize for &'static str {
    fn bold(self) -> ColoredString {
        self
    }

    fn bright_cyan(self) -> ColoredString {
        self
    }

    fn bright_red(self) -> ColoredString {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styled_text_keeps_its_content() {
        let styled = "error".bold().bright_red();
        assert!(styled.to_string().contains("error"));
    }
}
