/// Attributes of a local customer used to enrich a subscribe record. Any
/// attribute may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    /// Raw code as stored locally ("F", "M", ...)
    pub gender: Option<String>,
}

impl CustomerProfile {
    pub fn gender_label(&self) -> GenderLabel { GenderLabel::from_code(self.gender.as_deref()) }
}

/// Gender as presented to the mailing list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenderLabel {
    Female,
    Male,
    Unspecified,
}

impl GenderLabel {
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("F") => Self::Female,
            Some("M") => Self::Male,
            _ => Self::Unspecified,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Female => "Mujer",
            Self::Male => "Hombre",
            Self::Unspecified => "No especificado",
        }
    }
}
