use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(OverallStatus {
    Normal => "Normal",
    Abnormal => "Abnormal",
    Pending => "Pending",
});

str_enum!(ComparisonVerdict {
    Improved => "improved",
    Deteriorated => "deteriorated",
    Stable => "stable",
});

str_enum!(MetricChange {
    Improved => "improved",
    Deteriorated => "deteriorated",
    Stable => "stable",
});

/// Output language of the narrative.
///
/// Accepts either the UI language code (`en`, `ml`, ...) or the English
/// language name, case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetLanguage {
    #[default]
    English,
    Malayalam,
    Hindi,
    Tamil,
}

impl TargetLanguage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Malayalam => "Malayalam",
            Self::Hindi => "Hindi",
            Self::Tamil => "Tamil",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Malayalam => "ml",
            Self::Hindi => "hi",
            Self::Tamil => "ta",
        }
    }

    pub fn is_english(&self) -> bool {
        matches!(self, Self::English)
    }
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TargetLanguage {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "ml" | "malayalam" => Ok(Self::Malayalam),
            "hi" | "hindi" => Ok(Self::Hindi),
            "ta" | "tamil" => Ok(Self::Tamil),
            _ => Err(DatabaseError::InvalidEnum {
                field: "TargetLanguage".into(),
                value: s.into(),
            }),
        }
    }
}
