use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Plant location with its own generation series.
///
/// The string and serde forms are the name stored in the `locations` table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
pub enum Location {
    #[strum(serialize = "Awali")]
    Awali,
    #[strum(serialize = "Refinery")]
    Refinery,
    #[strum(serialize = "UOB")]
    #[serde(rename = "UOB")]
    Uob,
    #[strum(serialize = "Total System")]
    #[serde(rename = "Total System")]
    TotalSystem,
}

impl Location {
    /// Target column order used throughout the pipeline.
    pub const ALL: [Location; 4] = [
        Location::Awali,
        Location::Refinery,
        Location::Uob,
        Location::TotalSystem,
    ];

    /// Name as stored in the `locations` table.
    pub fn db_name(self) -> &'static str {
        self.into()
    }

    /// Short label used in feature display names and reports.
    pub fn label(self) -> &'static str {
        match self {
            Location::Awali => "Awali",
            Location::Refinery => "Refinery",
            Location::Uob => "UOB",
            Location::TotalSystem => "Total",
        }
    }

    /// Stem of the derived feature columns (`total_awali_rolling_avg_3`, ...).
    pub fn column_stem(self) -> &'static str {
        match self {
            Location::Awali => "total_awali",
            Location::Refinery => "total_refinery",
            Location::Uob => "total_UOB",
            Location::TotalSystem => "total_all",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Location::Awali => 0,
            Location::Refinery => 1,
            Location::Uob => 2,
            Location::TotalSystem => 3,
        }
    }
}

/// One value per location, indexed by [`Location`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerLocation<T>(pub [T; 4]);

impl<T> PerLocation<T> {
    pub fn from_fn(mut f: impl FnMut(Location) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Location::ALL[i])))
    }

    pub fn try_from_fn<E>(mut f: impl FnMut(Location) -> Result<T, E>) -> Result<Self, E> {
        let [a, b, c, d] = Location::ALL;
        Ok(Self([f(a)?, f(b)?, f(c)?, f(d)?]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Location, &T)> {
        Location::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(Location, &T) -> U) -> PerLocation<U> {
        PerLocation::from_fn(|location| f(location, &self[location]))
    }
}

impl<T> Index<Location> for PerLocation<T> {
    type Output = T;

    fn index(&self, location: Location) -> &T {
        &self.0[location.index()]
    }
}

impl<T> IndexMut<Location> for PerLocation<T> {
    fn index_mut(&mut self, location: Location) -> &mut T {
        &mut self.0[location.index()]
    }
}
