use crate::errors::DosingError;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Datatype of a published setting. Raw values are coerced to this type
/// before they reach the controller.
#[derive(
    EnumString,
    Display,
    IntoStaticStr,
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    /// Finite floating point number.
    Float,
    /// Non negative integer.
    Integer,
}

/// A coerced setting value.
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum SettingValue {
    /// Value of an `Integer` setting.
    Integer(u32),
    /// Value of a `Float` setting.
    Float(f64),
}

impl SettingValue {
    /// Numeric view of the value, used for range checks.
    pub fn as_f64(self) -> f64 {
        match self {
            SettingValue::Integer(value) => f64::from(value),
            SettingValue::Float(value) => value,
        }
    }
}

/// Settings published by the increase stress automation. The names are
/// the ones the host uses to read and write them.
#[derive(
    EnumString,
    Display,
    IntoStaticStr,
    EnumIter,
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
)]
#[strum(serialize_all = "snake_case")]
pub enum Setting {
    /// OD600 above which a dilution is triggered.
    TargetOd,
    /// mL pumped in and out per dilution, not the culture volume.
    Volume,
    /// Dilutions performed before the alternate media ratio steps up.
    Dilutions,
    /// Alternate media fraction the run started with.
    InitialAltMedia,
    /// Amount the alternate media fraction steps up by.
    AltMediaRatioIncrease,
    /// Live alternate media fraction.
    AltMediaRatio,
}

/// Metadata published alongside a setting.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct SettingDescriptor {
    /// Published name.
    pub name: &'static str,
    /// Datatype raw values are coerced to.
    pub datatype: Datatype,
    /// Unit, where one applies.
    pub unit: Option<&'static str>,
    /// Whether the host may write the setting at runtime.
    pub settable: bool,
}

/// A setting together with its current value, as re-published by the host.
#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
pub struct PublishedSetting {
    /// Setting metadata.
    #[serde(flatten)]
    pub descriptor: SettingDescriptor,
    /// Current value.
    pub value: SettingValue,
}

impl Setting {
    /// Look up a setting by its published name.
    ///
    /// * `name`: published setting name.
    pub fn from_name(name: &str) -> Result<Self, DosingError> {
        name.parse()
            .map_err(|_| DosingError::invalid(name, "unknown setting"))
    }

    /// Published metadata for the setting.
    pub fn descriptor(self) -> SettingDescriptor {
        let (datatype, unit) = match self {
            Setting::TargetOd => (Datatype::Float, Some("od600")),
            Setting::Volume => (Datatype::Float, Some("mL")),
            Setting::Dilutions => (Datatype::Integer, None),
            Setting::InitialAltMedia
            | Setting::AltMediaRatioIncrease
            | Setting::AltMediaRatio => (Datatype::Float, None),
        };
        SettingDescriptor {
            name: self.into(),
            datatype,
            unit,
            settable: true,
        }
    }

    /// Coerce a raw value to the setting's datatype and check its range.
    ///
    /// * `raw`: value as received from the host, e.g. "2.5".
    pub fn parse(self, raw: &str) -> Result<SettingValue, DosingError> {
        let raw = raw.trim();
        let value = match self.descriptor().datatype {
            Datatype::Float => raw.parse::<f64>().map(SettingValue::Float).map_err(|_| {
                DosingError::invalid(self.to_string(), format!("`{raw}` is not a float"))
            })?,
            Datatype::Integer => raw.parse::<u32>().map(SettingValue::Integer).map_err(|_| {
                DosingError::invalid(self.to_string(), format!("`{raw}` is not an integer"))
            })?,
        };
        self.check(value)?;
        Ok(value)
    }

    /// Range check a typed value for this setting.
    ///
    /// * `value`: typed value.
    pub fn check(self, value: SettingValue) -> Result<(), DosingError> {
        let expected = self.descriptor().datatype;
        let matches_datatype = matches!(
            (expected, value),
            (Datatype::Float, SettingValue::Float(_))
                | (Datatype::Integer, SettingValue::Integer(_))
        );
        if !matches_datatype {
            return Err(DosingError::invalid(
                self.to_string(),
                format!("expected a {expected} value"),
            ));
        }

        let number = value.as_f64();
        if !number.is_finite() {
            return Err(DosingError::invalid(self.to_string(), "must be finite"));
        }

        let in_range = match self {
            Setting::TargetOd | Setting::Volume => number > 0.0,
            Setting::Dilutions => number >= 1.0,
            Setting::InitialAltMedia | Setting::AltMediaRatio => (0.0..=1.0).contains(&number),
            Setting::AltMediaRatioIncrease => number >= 0.0,
        };
        if in_range {
            Ok(())
        } else {
            Err(DosingError::invalid(self.to_string(), self.range_hint()))
        }
    }

    fn range_hint(self) -> &'static str {
        match self {
            Setting::TargetOd | Setting::Volume => "must be greater than 0",
            Setting::Dilutions => "must be at least 1",
            Setting::InitialAltMedia | Setting::AltMediaRatio => "must be within [0, 1]",
            Setting::AltMediaRatioIncrease => "must not be negative",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(Setting::TargetOd, "2.5", SettingValue::Float(2.5))]
    #[case(Setting::Volume, " 1 ", SettingValue::Float(1.0))]
    #[case(Setting::Dilutions, "10", SettingValue::Integer(10))]
    #[case(Setting::InitialAltMedia, "0", SettingValue::Float(0.0))]
    #[case(Setting::AltMediaRatio, "1.0", SettingValue::Float(1.0))]
    #[case(Setting::AltMediaRatioIncrease, "0", SettingValue::Float(0.0))]
    fn test_raw_values_are_coerced(
        #[case] setting: Setting,
        #[case] raw: &str,
        #[case] expected: SettingValue,
    ) {
        assert_eq!(setting.parse(raw).expect("Failed to parse"), expected);
    }

    #[rstest]
    #[case(Setting::TargetOd, "high")]
    #[case(Setting::TargetOd, "0")]
    #[case(Setting::TargetOd, "NaN")]
    #[case(Setting::Volume, "-1.0")]
    #[case(Setting::Volume, "inf")]
    #[case(Setting::Dilutions, "0")]
    #[case(Setting::Dilutions, "2.5")]
    #[case(Setting::Dilutions, "-3")]
    #[case(Setting::InitialAltMedia, "1.01")]
    #[case(Setting::AltMediaRatio, "-0.1")]
    #[case(Setting::AltMediaRatioIncrease, "-0.05")]
    fn test_malformed_or_out_of_range_values_are_rejected(
        #[case] setting: Setting,
        #[case] raw: &str,
    ) {
        let expected = setting.to_string();
        let result = setting.parse(raw);
        assert!(
            matches!(
                result,
                Err(DosingError::InvalidConfiguration { ref parameter, .. })
                    if parameter == &expected
            ),
            "Expected {raw} to be rejected for {setting}"
        );
    }

    #[test]
    fn test_typed_value_must_match_datatype() {
        assert!(Setting::Dilutions.check(SettingValue::Float(10.0)).is_err());
        assert!(Setting::Volume.check(SettingValue::Integer(1)).is_err());
    }

    #[test]
    fn test_unknown_setting_name() {
        assert!(Setting::from_name("culture_volume").is_err());
        assert_eq!(
            Setting::from_name("alt_media_ratio_increase").expect("Unknown setting"),
            Setting::AltMediaRatioIncrease
        );
    }

    #[test]
    fn test_descriptors_are_published_with_units() {
        let descriptors: Vec<_> = Setting::iter().map(Setting::descriptor).collect();
        assert_eq!(descriptors.len(), 6);
        assert!(descriptors.iter().all(|descriptor| descriptor.settable));

        let target = Setting::TargetOd.descriptor();
        assert_eq!(target.name, "target_od");
        assert_eq!(target.unit, Some("od600"));
        assert_eq!(Setting::Volume.descriptor().unit, Some("mL"));
        assert_eq!(Setting::Dilutions.descriptor().datatype, Datatype::Integer);
    }
}
