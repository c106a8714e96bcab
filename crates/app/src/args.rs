use std::fmt;
use std::path::{Path, PathBuf};

use exam_core::model::{TestId, UserId};

#[derive(Debug)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidSeconds { raw: String },
    InvalidDbUrl { raw: String },
    MissingTest,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidSeconds { raw } => write!(f, "invalid --audio-secs value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingTest => write!(f, "--test is required for this command"),
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Seed,
    List,
    Take,
    Results,
}

impl Command {
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "list" => Some(Self::List),
            "take" => Some(Self::Take),
            "results" => Some(Self::Results),
            _ => None,
        }
    }

    fn needs_test(self) -> bool {
        matches!(self, Self::Take | Self::Results)
    }
}

#[derive(Debug, Clone)]
pub struct Args {
    pub command: Command,
    pub db_url: String,
    pub user_id: UserId,
    pub test_id: Option<TestId>,
    pub audio_secs: u64,
}

pub enum Parsed {
    Run(Args),
    Help,
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- seed    [--db <sqlite_url>] [--user <id>]");
    eprintln!("  cargo run -p app -- list    [--db <sqlite_url>] [--user <id>]");
    eprintln!("  cargo run -p app -- take    --test <id> [--db <sqlite_url>] [--user <id>] [--audio-secs <n>]");
    eprintln!("  cargo run -p app -- results --test <id> [--db <sqlite_url>] [--user <id>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://exam.sqlite3");
    eprintln!("  --user 1");
    eprintln!("  --audio-secs 30");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_USER_ID, EXAM_AUDIO_SECS, EXAM_TICK_MILLIS, EXAM_SAVE_POLICY, RUST_LOG");
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id(raw: String, flag: &'static str) -> Result<u64, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw })
}

impl Args {
    /// Parse `argv` without the program name. Environment values act as
    /// defaults that flags override.
    pub fn parse(
        argv: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Parsed, ArgsError> {
        let mut args = argv.into_iter();
        let command = match args.next() {
            None => return Ok(Parsed::Help),
            Some(first) if first == "--help" || first == "-h" => return Ok(Parsed::Help),
            Some(first) => Command::from_arg(&first).ok_or(ArgsError::UnknownCommand(first))?,
        };

        let mut db_url = env("EXAM_DB_URL")
            .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = env("EXAM_USER_ID")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or_else(|| UserId::new(1), UserId::new);
        let mut audio_secs = env("EXAM_AUDIO_SECS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(30);
        let mut test_id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user_id = UserId::new(parse_id(value, "--user")?);
                }
                "--test" => {
                    let value = require_value(&mut args, "--test")?;
                    test_id = Some(TestId::new(parse_id(value, "--test")?));
                }
                "--audio-secs" => {
                    let value = require_value(&mut args, "--audio-secs")?;
                    audio_secs = match value.trim().parse::<u64>() {
                        Ok(secs) if secs > 0 => secs,
                        _ => return Err(ArgsError::InvalidSeconds { raw: value }),
                    };
                }
                "--help" | "-h" => return Ok(Parsed::Help),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if command.needs_test() && test_id.is_none() {
            return Err(ArgsError::MissingTest);
        }

        Ok(Parsed::Run(Self {
            command,
            db_url,
            user_id,
            test_id,
            audio_secs,
        }))
    }
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

pub fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Parsed, ArgsError> {
        Args::parse(argv.iter().map(|s| (*s).to_string()), |_| None)
    }

    fn run_args(argv: &[&str]) -> Args {
        match parse(argv).unwrap() {
            Parsed::Run(args) => args,
            Parsed::Help => panic!("expected run args"),
        }
    }

    #[test]
    fn take_requires_a_test() {
        assert!(matches!(parse(&["take"]), Err(ArgsError::MissingTest)));
        let args = run_args(&["take", "--test", "4", "--user", "9"]);
        assert_eq!(args.command, Command::Take);
        assert_eq!(args.test_id, Some(TestId::new(4)));
        assert_eq!(args.user_id, UserId::new(9));
        assert_eq!(args.audio_secs, 30);
    }

    #[test]
    fn env_supplies_defaults() {
        let env = |key: &str| match key {
            "EXAM_DB_URL" => Some("sqlite::memory:".to_string()),
            "EXAM_USER_ID" => Some("12".to_string()),
            "EXAM_AUDIO_SECS" => Some("5".to_string()),
            _ => None,
        };
        let Parsed::Run(args) = Args::parse(vec!["list".to_string()], env).unwrap() else {
            panic!("expected run args");
        };
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.user_id, UserId::new(12));
        assert_eq!(args.audio_secs, 5);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse(&["grade"]), Err(ArgsError::UnknownCommand(_))));
        assert!(matches!(parse(&["list", "--verbose"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(
            parse(&["results", "--test", "x"]),
            Err(ArgsError::InvalidId { flag: "--test", .. })
        ));
        assert!(matches!(parse(&["list", "--db"]), Err(ArgsError::MissingValue { .. })));
        assert!(matches!(parse(&[]), Ok(Parsed::Help)));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/exam.db".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/exam.db"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
