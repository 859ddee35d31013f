//! Command surface of the telemetry engine.
//!
//! Commands arrive as whitespace-tokenized strings from an external
//! dispatcher (the console, or a UI transport). Parsing maps them onto a
//! closed enum; anything unrecognized is rejected so the engine can log
//! and ignore it.

/// A parsed engine command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Refresh the known mission list
    Update,
    /// Start replaying the named mission (name required to start)
    ReplayPlay(Option<String>),
    ReplayPause,
    ReplayResume,
    /// Set the replay speed factor; negative or unparseable input
    /// clamps to 0 (paused)
    ReplaySpeed(f64),
    ReplayStop,
    /// Start recording, defaulting the name to the current epoch seconds
    RecordStart(Option<String>),
    RecordStop,
}

impl Command {
    /// Map a token list onto a command. Mission names may contain spaces,
    /// so trailing tokens are joined.
    pub fn parse(tokens: &[String]) -> Option<Command> {
        let rest_as_name = |from: usize| -> Option<String> {
            if tokens.len() > from {
                Some(tokens[from..].join(" "))
            } else {
                None
            }
        };

        match tokens.first().map(String::as_str) {
            Some("update") if tokens.len() == 1 => Some(Command::Update),
            Some("replay") => match tokens.get(1).map(String::as_str) {
                Some("play") => Some(Command::ReplayPlay(rest_as_name(2))),
                Some("pause") => Some(Command::ReplayPause),
                Some("resume") => Some(Command::ReplayResume),
                Some("speed") => {
                    let speed = tokens
                        .get(2)
                        .and_then(|s| s.parse::<f64>().ok())
                        .filter(|s| s.is_finite())
                        .unwrap_or(0.0)
                        .max(0.0);
                    Some(Command::ReplaySpeed(speed))
                }
                Some("stop") => Some(Command::ReplayStop),
                _ => None,
            },
            Some("record") => match tokens.get(1).map(String::as_str) {
                Some("start") => Some(Command::RecordStart(rest_as_name(2))),
                Some("stop") => Some(Command::RecordStop),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(&tokens("update")), Some(Command::Update));
        assert_eq!(
            Command::parse(&tokens("replay play")),
            Some(Command::ReplayPlay(None))
        );
        assert_eq!(
            Command::parse(&tokens("replay play flight 12 final")),
            Some(Command::ReplayPlay(Some("flight 12 final".to_string())))
        );
        assert_eq!(
            Command::parse(&tokens("replay pause")),
            Some(Command::ReplayPause)
        );
        assert_eq!(
            Command::parse(&tokens("replay resume")),
            Some(Command::ReplayResume)
        );
        assert_eq!(
            Command::parse(&tokens("replay speed 2.5")),
            Some(Command::ReplaySpeed(2.5))
        );
        assert_eq!(
            Command::parse(&tokens("replay stop")),
            Some(Command::ReplayStop)
        );
        assert_eq!(
            Command::parse(&tokens("record start")),
            Some(Command::RecordStart(None))
        );
        assert_eq!(
            Command::parse(&tokens("record start launch day")),
            Some(Command::RecordStart(Some("launch day".to_string())))
        );
        assert_eq!(
            Command::parse(&tokens("record stop")),
            Some(Command::RecordStop)
        );
    }

    #[test]
    fn test_speed_clamping() {
        assert_eq!(
            Command::parse(&tokens("replay speed -3")),
            Some(Command::ReplaySpeed(0.0))
        );
        assert_eq!(
            Command::parse(&tokens("replay speed fast")),
            Some(Command::ReplaySpeed(0.0))
        );
        assert_eq!(
            Command::parse(&tokens("replay speed")),
            Some(Command::ReplaySpeed(0.0))
        );
        assert_eq!(
            Command::parse(&tokens("replay speed NaN")),
            Some(Command::ReplaySpeed(0.0))
        );
    }

    #[test]
    fn test_unknown_rejected() {
        assert_eq!(Command::parse(&tokens("launch")), None);
        assert_eq!(Command::parse(&tokens("replay warp")), None);
        assert_eq!(Command::parse(&tokens("record")), None);
        assert_eq!(Command::parse(&[]), None);
        assert_eq!(Command::parse(&tokens("update please")), None);
    }
}
