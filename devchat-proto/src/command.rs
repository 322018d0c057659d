//! Local "open ..." commands handled by a client instead of being sent.
//!
//! Chat clients check outgoing text with [`LocalCommand::parse`] first;
//! matching text is acted on locally and never reaches the relay.

/// Known launch targets and the URI each one opens.
const OPEN_TARGETS: &[(&str, &str)] = &[
    ("calculator", "calculator://"),
    ("camera", "camera://"),
    ("maps", "maps://"),
    ("phone", "tel://"),
    ("email", "mailto://"),
    ("google", "https://google.com"),
    ("youtube", "https://youtube.com"),
];

/// A command the client executes itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCommand {
    /// Open the preview of the project currently running in the sandbox.
    OpenRunningApp,
    /// Open a known app or website.
    OpenTarget {
        /// Target name as typed.
        name: String,
        /// URI to hand to the platform opener.
        uri: &'static str,
    },
}

impl LocalCommand {
    /// Parses outgoing chat text. Returns `None` for ordinary messages.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("open the app") || lower.contains("open app") {
            return Some(Self::OpenRunningApp);
        }

        let name = lower.strip_prefix("open ")?.trim();
        OPEN_TARGETS
            .iter()
            .find(|(target, _)| *target == name)
            .map(|(target, uri)| Self::OpenTarget {
                name: (*target).to_string(),
                uri,
            })
    }
}
