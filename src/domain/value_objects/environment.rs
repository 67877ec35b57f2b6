use strum::{Display, EnumString, IntoStaticStr, VariantNames};

/// Deployment environment the platform reports through the `ENVIRONMENT` binding
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, VariantNames,
)]
#[strum(serialize_all = "lowercase")]
pub enum AppEnvironment {
    #[default]
    Development,
    Production,
    Preview,
}

impl AppEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, AppEnvironment::Production)
    }
}

/// Build mode of the toolchain that produced the process (`NODE_ENV`)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, VariantNames,
)]
#[strum(serialize_all = "lowercase")]
pub enum NodeEnvironment {
    #[default]
    Development,
    Production,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_environment_names_round_trip() {
        for name in AppEnvironment::VARIANTS {
            let env = AppEnvironment::from_str(name).unwrap();
            assert_eq!(env.to_string(), *name);
        }
        assert_eq!(AppEnvironment::VARIANTS, &["development", "production", "preview"]);
        assert_eq!(NodeEnvironment::VARIANTS, &["development", "production"]);
    }

    #[test]
    fn test_unknown_environment() {
        assert!(AppEnvironment::from_str("staging").is_err());
        assert!(NodeEnvironment::from_str("preview").is_err());
    }
}
