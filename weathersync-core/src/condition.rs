//! Shared condition-code vocabulary.
//!
//! Every adapter maps its native icon/symbol identifiers onto these codes.
//! Codes are small integers `0..=47`; [`NOT_AVAILABLE`] (`-1`) marks an
//! unknown or unmapped condition.

use std::fmt;

/// Code used when a provider condition has no counterpart in the table.
pub const NOT_AVAILABLE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Condition {
    Tornado = 0,
    TropicalStorm = 1,
    Hurricane = 2,
    SevereThunderstorms = 3,
    Thunderstorms = 4,
    MixedRainAndSnow = 5,
    MixedRainAndSleet = 6,
    MixedSnowAndSleet = 7,
    FreezingDrizzle = 8,
    Drizzle = 9,
    FreezingRain = 10,
    Showers = 11,
    HeavyShowers = 12,
    SnowFlurries = 13,
    LightSnowShowers = 14,
    BlowingSnow = 15,
    Snow = 16,
    Hail = 17,
    Sleet = 18,
    Dust = 19,
    Foggy = 20,
    Haze = 21,
    Smoky = 22,
    Blustery = 23,
    Windy = 24,
    Cold = 25,
    Cloudy = 26,
    MostlyCloudyNight = 27,
    MostlyCloudyDay = 28,
    PartlyCloudyNight = 29,
    PartlyCloudyDay = 30,
    ClearNight = 31,
    Sunny = 32,
    FairNight = 33,
    FairDay = 34,
    MixedRainAndHail = 35,
    Hot = 36,
    IsolatedThunderstorms = 37,
    ScatteredThunderstorms = 38,
    ScatteredThunderstormsLate = 39,
    ScatteredShowers = 40,
    HeavySnow = 41,
    ScatteredSnowShowers = 42,
    HeavySnowWindy = 43,
    PartlyCloudy = 44,
    Thundershowers = 45,
    SnowShowers = 46,
    IsolatedThundershowers = 47,
}

const ALL: [Condition; 48] = [
    Condition::Tornado,
    Condition::TropicalStorm,
    Condition::Hurricane,
    Condition::SevereThunderstorms,
    Condition::Thunderstorms,
    Condition::MixedRainAndSnow,
    Condition::MixedRainAndSleet,
    Condition::MixedSnowAndSleet,
    Condition::FreezingDrizzle,
    Condition::Drizzle,
    Condition::FreezingRain,
    Condition::Showers,
    Condition::HeavyShowers,
    Condition::SnowFlurries,
    Condition::LightSnowShowers,
    Condition::BlowingSnow,
    Condition::Snow,
    Condition::Hail,
    Condition::Sleet,
    Condition::Dust,
    Condition::Foggy,
    Condition::Haze,
    Condition::Smoky,
    Condition::Blustery,
    Condition::Windy,
    Condition::Cold,
    Condition::Cloudy,
    Condition::MostlyCloudyNight,
    Condition::MostlyCloudyDay,
    Condition::PartlyCloudyNight,
    Condition::PartlyCloudyDay,
    Condition::ClearNight,
    Condition::Sunny,
    Condition::FairNight,
    Condition::FairDay,
    Condition::MixedRainAndHail,
    Condition::Hot,
    Condition::IsolatedThunderstorms,
    Condition::ScatteredThunderstorms,
    Condition::ScatteredThunderstormsLate,
    Condition::ScatteredShowers,
    Condition::HeavySnow,
    Condition::ScatteredSnowShowers,
    Condition::HeavySnowWindy,
    Condition::PartlyCloudy,
    Condition::Thundershowers,
    Condition::SnowShowers,
    Condition::IsolatedThundershowers,
];

impl Condition {
    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code).ok().and_then(|idx| ALL.get(idx).copied())
    }

    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn description(self) -> &'static str {
        match self {
            Condition::Tornado => "tornado",
            Condition::TropicalStorm => "tropical storm",
            Condition::Hurricane => "hurricane",
            Condition::SevereThunderstorms => "severe thunderstorms",
            Condition::Thunderstorms => "thunderstorms",
            Condition::MixedRainAndSnow => "mixed rain and snow",
            Condition::MixedRainAndSleet => "mixed rain and sleet",
            Condition::MixedSnowAndSleet => "mixed snow and sleet",
            Condition::FreezingDrizzle => "freezing drizzle",
            Condition::Drizzle => "drizzle",
            Condition::FreezingRain => "freezing rain",
            Condition::Showers => "showers",
            Condition::HeavyShowers => "heavy showers",
            Condition::SnowFlurries => "snow flurries",
            Condition::LightSnowShowers => "light snow showers",
            Condition::BlowingSnow => "blowing snow",
            Condition::Snow => "snow",
            Condition::Hail => "hail",
            Condition::Sleet => "sleet",
            Condition::Dust => "dust",
            Condition::Foggy => "foggy",
            Condition::Haze => "haze",
            Condition::Smoky => "smoky",
            Condition::Blustery => "blustery",
            Condition::Windy => "windy",
            Condition::Cold => "cold",
            Condition::Cloudy => "cloudy",
            Condition::MostlyCloudyNight | Condition::MostlyCloudyDay => "mostly cloudy",
            Condition::PartlyCloudyNight | Condition::PartlyCloudyDay | Condition::PartlyCloudy => {
                "partly cloudy"
            }
            Condition::ClearNight => "clear",
            Condition::Sunny => "sunny",
            Condition::FairNight | Condition::FairDay => "fair",
            Condition::MixedRainAndHail => "mixed rain and hail",
            Condition::Hot => "hot",
            Condition::IsolatedThunderstorms => "isolated thunderstorms",
            Condition::ScatteredThunderstorms | Condition::ScatteredThunderstormsLate => {
                "scattered thunderstorms"
            }
            Condition::ScatteredShowers => "scattered showers",
            Condition::HeavySnow | Condition::HeavySnowWindy => "heavy snow",
            Condition::ScatteredSnowShowers => "scattered snow showers",
            Condition::Thundershowers => "thundershowers",
            Condition::SnowShowers => "snow showers",
            Condition::IsolatedThundershowers => "isolated thundershowers",
        }
    }

    /// Night counterpart of a daytime sky state. Codes without one are
    /// returned unchanged.
    pub fn night_variant(self) -> Self {
        match self {
            Condition::Sunny => Condition::ClearNight,
            Condition::FairDay => Condition::FairNight,
            Condition::PartlyCloudyDay => Condition::PartlyCloudyNight,
            Condition::MostlyCloudyDay => Condition::MostlyCloudyNight,
            other => other,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Clamp an arbitrary integer into the shared vocabulary.
pub fn normalize_code(code: i32) -> i32 {
    Condition::from_code(code).map_or(NOT_AVAILABLE, Condition::code)
}

/// Apply [`Condition::night_variant`] to a raw code, passing `-1` through.
pub fn night_code(code: i32) -> i32 {
    Condition::from_code(code).map_or(code, |c| c.night_variant().code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_index_matches_discriminant() {
        for (idx, condition) in ALL.iter().enumerate() {
            assert_eq!(condition.code(), idx as i32);
        }
    }

    #[test]
    fn out_of_range_codes_become_not_available() {
        assert_eq!(normalize_code(48), NOT_AVAILABLE);
        assert_eq!(normalize_code(3200), NOT_AVAILABLE);
        assert_eq!(normalize_code(-7), NOT_AVAILABLE);
        assert_eq!(normalize_code(0), 0);
        assert_eq!(normalize_code(47), 47);
    }

    #[test]
    fn night_variants_only_touch_sky_states() {
        assert_eq!(night_code(32), 31);
        assert_eq!(night_code(34), 33);
        assert_eq!(night_code(30), 29);
        assert_eq!(night_code(28), 27);
        assert_eq!(night_code(11), 11);
        assert_eq!(night_code(NOT_AVAILABLE), NOT_AVAILABLE);
    }
}
