//! The command manifest: what to run, with what arguments, on what period.

/// A scheduled invocation. `period_seconds` of `0` means "run back-to-back
/// without waiting"; any strictly positive value sleeps that long before
/// each invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub name: String,
    pub argv: Vec<String>,
    pub period_seconds: f64,
}

impl Command {
    pub fn new(name: impl Into<String>, argv: Vec<String>, period_seconds: f64) -> Self {
        Command {
            name: name.into(),
            argv,
            period_seconds,
        }
    }
}

/// The built-in manifest: `read_hwmon_temp` and `read_correrrcnt` every
/// 60 seconds, the latter scoped to the named device IDs.
pub fn default_manifest() -> Vec<Command> {
    vec![
        Command::new("read_hwmon_temp", vec![], 60.0),
        Command::new(
            "read_correrrcnt",
            vec![
                "0x6fb2", "0x6fb3", "0x6fb6", "0x6fb7", "0x6fd2", "0x6fd3", "0x6fd6", "0x6fd7",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            60.0,
        ),
    ]
}
