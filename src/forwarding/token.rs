use std::fmt;

/// One keycode identifier bound for the remote endpoint
///
/// Tokens end up inside a remote shell command line, so only ASCII
/// alphanumerics and `_` are accepted (`KEYCODE_DPAD_UP`, `19`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandToken(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid command token `{0}`")]
pub struct InvalidToken(pub String);

impl CommandToken {
    /// Parse one handoff line: `Ok(None)` for blank lines
    pub fn from_line(line: &str) -> Result<Option<Self>, InvalidToken> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Self::new(trimmed).map(Some)
    }

    pub fn new(token: &str) -> Result<Self, InvalidToken> {
        let valid = !token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if valid {
            Ok(Self(token.to_string()))
        } else {
            Err(InvalidToken(token.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let token = CommandToken::from_line("  KEYCODE_DPAD_UP\r\n").unwrap().unwrap();
        assert_eq!(token.as_str(), "KEYCODE_DPAD_UP");
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(CommandToken::from_line(""), Ok(None));
        assert_eq!(CommandToken::from_line(" \t "), Ok(None));
    }

    #[test]
    fn numeric_keycodes_are_tokens() {
        assert!(CommandToken::new("19").is_ok());
    }

    #[test]
    fn shell_metacharacters_are_rejected() {
        for bad in ["KEYCODE_HOME; reboot", "a b", "$(id)", "KEY|CODE", "ключ"] {
            assert!(CommandToken::from_line(bad).is_err(), "{bad}");
        }
    }
}
