use specta::Type;

/// Level of an org in the nation → sector → area → region → AO hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum OrgType {
    Nation,
    Sector,
    Area,
    Region,
    Ao,
}

impl OrgType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrgType::Nation => "nation",
            OrgType::Sector => "sector",
            OrgType::Area => "area",
            OrgType::Region => "region",
            OrgType::Ao => "ao",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "nation" => Some(OrgType::Nation),
            "sector" => Some(OrgType::Sector),
            "area" => Some(OrgType::Area),
            "region" => Some(OrgType::Region),
            "ao" => Some(OrgType::Ao),
            _ => None,
        }
    }

    /// Whether an org of type `self` may sit directly under a parent of type
    /// `parent`. Only the five adjacent edges of the hierarchy are valid.
    pub fn is_child_of(self, parent: OrgType) -> bool {
        matches!(
            (parent, self),
            (OrgType::Nation, OrgType::Sector)
                | (OrgType::Sector, OrgType::Area)
                | (OrgType::Area, OrgType::Region)
                | (OrgType::Region, OrgType::Ao)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "monday" => Some(DayOfWeek::Monday),
            "tuesday" => Some(DayOfWeek::Tuesday),
            "wednesday" => Some(DayOfWeek::Wednesday),
            "thursday" => Some(DayOfWeek::Thursday),
            "friday" => Some(DayOfWeek::Friday),
            "saturday" => Some(DayOfWeek::Saturday),
            "sunday" => Some(DayOfWeek::Sunday),
            _ => None,
        }
    }
}

/// Recurrence pattern of a recurring workout event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Weekly,
    MonthlyFirst,
    MonthlyLast,
}

impl Recurrence {
    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::Weekly => "weekly",
            Recurrence::MonthlyFirst => "monthly_first",
            Recurrence::MonthlyLast => "monthly_last",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "weekly" => Some(Recurrence::Weekly),
            "monthly_first" => Some(Recurrence::MonthlyFirst),
            "monthly_last" => Some(Recurrence::MonthlyLast),
            _ => None,
        }
    }
}

/// Moderation state of an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// Role a user (or API key grant) holds on one org.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Admin,
    Editor,
}

impl OrgRole {
    pub fn as_str(self) -> &'static str {
        match self {
            OrgRole::Admin => "admin",
            OrgRole::Editor => "editor",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(OrgRole::Admin),
            "editor" => Some(OrgRole::Editor),
            _ => None,
        }
    }

    /// Admin implies every editor capability.
    pub fn can_moderate(self) -> bool {
        matches!(self, OrgRole::Admin | OrgRole::Editor)
    }
}

/// "HHMM" wall-clock string used for event start/end times.
pub fn valid_hhmm(raw: &str) -> bool {
    if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let hh: u32 = raw[..2].parse().unwrap_or(99);
    let mm: u32 = raw[2..].parse().unwrap_or(99);
    hh < 24 && mm < 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_hierarchy_edges() {
        assert!(OrgType::Ao.is_child_of(OrgType::Region));
        assert!(OrgType::Region.is_child_of(OrgType::Area));
        assert!(OrgType::Area.is_child_of(OrgType::Sector));
        assert!(OrgType::Sector.is_child_of(OrgType::Nation));
        assert!(!OrgType::Ao.is_child_of(OrgType::Nation));
        assert!(!OrgType::Nation.is_child_of(OrgType::Sector));
        assert!(!OrgType::Region.is_child_of(OrgType::Region));
    }

    #[test]
    fn org_type_round_trips_through_storage_form() {
        for t in [
            OrgType::Nation,
            OrgType::Sector,
            OrgType::Area,
            OrgType::Region,
            OrgType::Ao,
        ] {
            assert_eq!(OrgType::parse(t.as_str()), Some(t));
        }
        assert_eq!(OrgType::parse("galaxy"), None);
    }

    #[test]
    fn hhmm_validation() {
        assert!(valid_hhmm("0530"));
        assert!(valid_hhmm("2359"));
        assert!(!valid_hhmm("2400"));
        assert!(!valid_hhmm("0560"));
        assert!(!valid_hhmm("530"));
        assert!(!valid_hhmm("05:30"));
    }

    #[test]
    fn roles_can_moderate() {
        assert!(OrgRole::Admin.can_moderate());
        assert!(OrgRole::Editor.can_moderate());
    }
}
