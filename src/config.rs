/// Startup configuration, read from the command line: `tarn <port> <password>`.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TCP port to listen on (bound to 0.0.0.0).
    pub port: u16,
    /// Connection password checked by PASS.
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("usage: tarn <port> <password>")]
    Usage,
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

impl Config {
    /// Parse from an argv-style iterator (the first element is the program name).
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter().skip(1);
        let port = args.next().ok_or(ConfigError::Usage)?;
        let password = args.next().ok_or(ConfigError::Usage)?;
        if args.next().is_some() {
            return Err(ConfigError::Usage);
        }
        let port = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        Ok(Config { port, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_port_and_password() {
        let cfg = Config::from_args(argv(&["tarn", "6667", "secret"])).unwrap();
        assert_eq!(
            cfg,
            Config {
                port: 6667,
                password: "secret".into()
            }
        );
    }

    #[test]
    fn missing_arguments() {
        assert_eq!(Config::from_args(argv(&["tarn"])), Err(ConfigError::Usage));
        assert_eq!(
            Config::from_args(argv(&["tarn", "6667"])),
            Err(ConfigError::Usage)
        );
    }

    #[test]
    fn extra_arguments_rejected() {
        assert_eq!(
            Config::from_args(argv(&["tarn", "6667", "secret", "extra"])),
            Err(ConfigError::Usage)
        );
    }

    #[test]
    fn bad_port() {
        assert_eq!(
            Config::from_args(argv(&["tarn", "irc", "secret"])),
            Err(ConfigError::InvalidPort("irc".into()))
        );
        assert_eq!(
            Config::from_args(argv(&["tarn", "99999", "secret"])),
            Err(ConfigError::InvalidPort("99999".into()))
        );
    }
}
