use config::{Config, File, FileFormat};
use std::env;

const DEFAULT_SECURE_PROFILE_PATH: &str = "/etc/krb5.conf";
const DEFAULT_PROFILE_PATH: &str = DEFAULT_SECURE_PROFILE_PATH;

/// Layered view over krb5.conf style files; the first file that defines a
/// key wins.
#[derive(Debug)]
pub struct Profile {
    files: Vec<ProfileFile>,
}

macro_rules! get_value {
    ($fn:ident, $type:ident) => {
        pub fn $fn(&self, key: &str) -> Option<$type> {
            self.files
                .iter()
                .find_map(|file| file.config.$fn(key).ok())
        }
    };
}

impl Profile {
    pub fn new(secure: bool) -> anyhow::Result<Self> {
        let mut files = vec![];
        for filename in Self::default_config_files(secure) {
            files.push(ProfileFile::new(&filename)?);
        }
        Ok(Self { files })
    }

    pub fn from_str(contents: &str) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Ini))
            .build()?;
        Ok(Self {
            files: vec![ProfileFile { config }],
        })
    }

    pub fn empty() -> Self {
        Self { files: vec![] }
    }

    fn default_config_files(secure: bool) -> Vec<String> {
        let filepath = if secure {
            DEFAULT_SECURE_PROFILE_PATH.to_owned()
        } else {
            env::var("KRB5_CONFIG").unwrap_or_else(|_| DEFAULT_PROFILE_PATH.to_owned())
        };
        filepath
            .split(':')
            .filter(|f| !f.is_empty())
            .map(|f| f.to_owned())
            .collect()
    }

    get_value!(get_string, String);

    get_value!(get_bool, bool);

    get_value!(get_int, i64);
}

#[derive(Debug)]
struct ProfileFile {
    config: Config,
}

impl ProfileFile {
    fn new(filename: &str) -> anyhow::Result<Self> {
        let expanded_filename = match (filename.strip_prefix("~/"), env::var("HOME")) {
            (Some(rest), Ok(home_env)) => format!("{}/{}", home_env, rest),
            _ => filename.to_owned(),
        };
        // krb5.conf is optional; a missing file just contributes nothing.
        let config = Config::builder()
            .add_source(
                File::with_name(&expanded_filename)
                    .format(FileFormat::Ini)
                    .required(false),
            )
            .build()?;
        Ok(Self { config })
    }
}
