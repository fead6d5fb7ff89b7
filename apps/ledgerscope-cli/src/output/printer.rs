//! Status lines on stderr; stdout is reserved for reports.

/// How a status line is marked.
#[derive(Clone, Copy)]
enum Tone {
    Success,
    Warning,
    Info,
}

impl Tone {
    fn ansi(self) -> &'static str {
        match self {
            Tone::Success => "32",
            Tone::Warning => "33",
            Tone::Info => "34",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Tone::Success => "OK",
            Tone::Warning => "Warning",
            Tone::Info => "Info",
        }
    }
}

fn colored() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

fn status(tone: Tone, message: &str) {
    if colored() {
        eprintln!("\x1b[{}m{}:\x1b[0m {message}", tone.ansi(), tone.label());
    } else {
        eprintln!("{}: {message}", tone.label());
    }
}

pub fn print_success(message: &str) {
    status(Tone::Success, message);
}

pub fn print_warning(message: &str) {
    status(Tone::Warning, message);
}

pub fn print_info(message: &str) {
    status(Tone::Info, message);
}

/// An indented `key: value` line, key in bold.
pub fn print_key_value(key: &str, value: &str) {
    if colored() {
        eprintln!("  \x1b[1m{key}:\x1b[0m {value}");
    } else {
        eprintln!("  {key}: {value}");
    }
}
