//! Validation helpers for inbound DTOs.

use validator::{Validate, ValidationError, ValidationErrors};

use crate::{dto::ws::ConfigField, error::GameError};

/// Characters refused in display names because clients render them as markup.
const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', '"', '\'', '&', ';'];

/// Display name as submitted with a join request.
#[derive(Debug, Validate)]
pub struct DisplayName {
    /// Trimmed name.
    #[validate(length(min = 1, max = 20), custom(function = "validate_name_charset"))]
    pub value: String,
}

impl DisplayName {
    /// Trim and validate a raw name.
    pub fn parse(raw: &str) -> Result<String, GameError> {
        let candidate = Self {
            value: raw.trim().to_owned(),
        };
        candidate
            .validate()
            .map_err(|_| GameError::NameInvalid)?;
        Ok(candidate.value)
    }
}

/// Rejects markup characters and control characters.
pub fn validate_name_charset(name: &str) -> Result<(), ValidationError> {
    if name
        .chars()
        .any(|c| FORBIDDEN_NAME_CHARS.contains(&c) || c.is_control())
    {
        let mut err = ValidationError::new("name_charset");
        err.message = Some("Name contains characters that are not allowed".into());
        return Err(err);
    }
    Ok(())
}

/// Partial settings update issued by the host from the lobby.
#[derive(Debug, Default, Validate)]
pub struct SettingsPatch {
    /// New questioning length, in minutes.
    #[validate(range(min = 1, max = 30))]
    pub round_duration_minutes: Option<u32>,
    /// New number of rounds.
    #[validate(range(min = 1, max = 20))]
    pub num_rounds: Option<u32>,
    /// New location pack id; existence is checked against the content store.
    #[validate(length(min = 1))]
    pub location_pack: Option<String>,
}

impl SettingsPatch {
    /// Build and validate a single-field patch from a `configure` command. Numbers
    /// may arrive as JSON numbers or numeric strings.
    pub fn from_field(field: ConfigField, value: &serde_json::Value) -> Result<Self, GameError> {
        let patch = match field {
            ConfigField::RoundDurationMinutes => Self {
                round_duration_minutes: Some(
                    whole_number(value).ok_or(GameError::InvalidDuration)?,
                ),
                ..Self::default()
            },
            ConfigField::NumRounds => Self {
                num_rounds: Some(whole_number(value).ok_or(GameError::InvalidRounds)?),
                ..Self::default()
            },
            ConfigField::LocationPack => Self {
                location_pack: Some(
                    value
                        .as_str()
                        .map(|pack| pack.trim().to_owned())
                        .ok_or(GameError::InvalidPack)?,
                ),
                ..Self::default()
            },
        };
        patch.check()?;
        Ok(patch)
    }

    /// Run field validation and translate the first failure into a game error.
    pub fn check(&self) -> Result<(), GameError> {
        self.validate().map_err(|errors| settings_error(&errors))
    }
}

fn whole_number(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .and_then(|number| u32::try_from(number).ok())
}

fn settings_error(errors: &ValidationErrors) -> GameError {
    let fields = errors.errors();
    if fields.contains_key("round_duration_minutes") {
        GameError::InvalidDuration
    } else if fields.contains_key("num_rounds") {
        GameError::InvalidRounds
    } else {
        GameError::InvalidPack
    }
}
