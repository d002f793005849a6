use std::fmt::Write;

use crate::supervisor::{Bucket, ListedStream};

/// Prefix every bot command starts with.
pub const COMMAND_PREFIX: &str = "!lssd";

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Add(String),
    Cancel(String),
    List,
}

impl ChatCommand {
    /**
        Parse `!lssd <verb> <argument>`.

        The argument is the trimmed remainder after the verb. Messages without
        the prefix and unknown verbs yield `None`.
    */
    pub fn parse(content: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(COMMAND_PREFIX)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }

        let rest = rest.trim_start();
        let (verb, argument) = match rest.split_once(char::is_whitespace) {
            Some((verb, argument)) => (verb, argument.trim()),
            None => (rest, ""),
        };

        match verb {
            "add" => Some(ChatCommand::Add(argument.to_string())),
            "cancel" => Some(ChatCommand::Cancel(argument.to_string())),
            "list" => Some(ChatCommand::List),
            _ => None,
        }
    }
}

/// Render the supervisor snapshot as the two-section `list` reply.
pub fn format_list(streams: &[ListedStream]) -> String {
    let mut out = String::new();

    for (heading, bucket) in [("Queued", Bucket::Waiting), ("Recordings", Bucket::Recording)] {
        let _ = writeln!(out, "**{heading}**:");
        for stream in streams.iter().filter(|s| s.bucket == bucket) {
            let _ = writeln!(out, "● `{}` - {}", stream.video_id, stream.title);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        assert_eq!(
            ChatCommand::parse("!lssd add https://youtu.be/dQw4w9WgXcQ"),
            Some(ChatCommand::Add("https://youtu.be/dQw4w9WgXcQ".to_string()))
        );
        assert_eq!(
            ChatCommand::parse("!lssd add   dQw4w9WgXcQ  "),
            Some(ChatCommand::Add("dQw4w9WgXcQ".to_string()))
        );
        assert_eq!(
            ChatCommand::parse("!lssd add"),
            Some(ChatCommand::Add(String::new()))
        );
    }

    #[test]
    fn test_parse_cancel_and_list() {
        assert_eq!(
            ChatCommand::parse("!lssd cancel dQw4w9WgXcQ"),
            Some(ChatCommand::Cancel("dQw4w9WgXcQ".to_string()))
        );
        assert_eq!(ChatCommand::parse("!lssd list"), Some(ChatCommand::List));
        assert_eq!(ChatCommand::parse("!lssd list now"), Some(ChatCommand::List));
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(ChatCommand::parse("hello"), None);
        assert_eq!(ChatCommand::parse("!lssd"), None);
        assert_eq!(ChatCommand::parse("!lssd remove x"), None);
        assert_eq!(ChatCommand::parse("!lssdadd x"), None);
        assert_eq!(ChatCommand::parse("please !lssd list"), None);
    }

    #[test]
    fn test_format_list() {
        let streams = vec![
            ListedStream {
                video_id: "aaaaaaaaaaa".to_string(),
                title: "Morning stream".to_string(),
                bucket: Bucket::Waiting,
            },
            ListedStream {
                video_id: "bbbbbbbbbbb".to_string(),
                title: "Night stream".to_string(),
                bucket: Bucket::Recording,
            },
        ];

        assert_eq!(
            format_list(&streams),
            "**Queued**:\n\
             ● `aaaaaaaaaaa` - Morning stream\n\
             **Recordings**:\n\
             ● `bbbbbbbbbbb` - Night stream\n"
        );
    }

    #[test]
    fn test_format_empty_list() {
        assert_eq!(format_list(&[]), "**Queued**:\n**Recordings**:\n");
    }
}
