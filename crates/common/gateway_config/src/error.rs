use camino::Utf8PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Fail to read the config file '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Toml syntax error in the config file '{path}': {reason}")]
    InvalidSyntax { path: Utf8PathBuf, reason: String },

    #[error("Invalid log level: {name:?}, supported levels are trace, debug, info, warn and error")]
    InvalidLogLevel { name: String },

    #[error("No device identity configured: either `gateway.certificate_bundle` or both `gateway.certificate` and `gateway.secret` are required")]
    MissingIdentity,

    #[error(transparent)]
    Identity(#[from] certificate::IdentityError),
}
