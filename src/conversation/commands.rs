//! Slash commands recognized before step handling.

/// A global command. Matching is a case-sensitive prefix match, so
/// `/nuevo@JarvisBot` still starts a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    ListFiles,
    Cancel,
    Configure,
    NewReport,
}

impl Command {
    /// Parse a command from raw message text. Anything else is step input.
    pub fn parse(text: &str) -> Option<Command> {
        const TABLE: &[(&str, Command)] = &[
            ("/start", Command::Help),
            ("/ayuda", Command::Help),
            ("/archivos", Command::ListFiles),
            ("/cancelar", Command::Cancel),
            ("/configurar", Command::Configure),
            ("/nuevo", Command::NewReport),
        ];
        TABLE
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix))
            .map(|(_, cmd)| *cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Help));
        assert_eq!(Command::parse("/ayuda"), Some(Command::Help));
        assert_eq!(Command::parse("/archivos"), Some(Command::ListFiles));
        assert_eq!(Command::parse("/cancelar"), Some(Command::Cancel));
        assert_eq!(Command::parse("/configurar"), Some(Command::Configure));
        assert_eq!(Command::parse("/nuevo"), Some(Command::NewReport));
    }

    #[test]
    fn prefix_match_allows_bot_suffix() {
        assert_eq!(Command::parse("/nuevo@JarvisBot"), Some(Command::NewReport));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(Command::parse("/NUEVO"), None);
        assert_eq!(Command::parse("nuevo"), None);
    }

    #[test]
    fn free_text_is_not_a_command() {
        assert_eq!(Command::parse("Ley de Ohm"), None);
        assert_eq!(Command::parse(" /nuevo"), None);
    }
}
