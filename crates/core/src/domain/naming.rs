use chrono::NaiveDate;

/// An ad name following the `YYYYMMDD_CREATOR_CONCEPT_FORMAT` convention,
/// e.g. `20260105_JD_UGC-Hook_Video`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdName {
    pub launch_date: NaiveDate,
    pub creator: String,
    pub concept: String,
    pub format: String,
}

impl AdName {
    pub fn parse(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.trim().split('_').map(str::trim).collect();
        if parts.len() < 4 {
            return None;
        }

        let date = parts[0];
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let launch_date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;

        let creator = parts[1];
        let format = parts[parts.len() - 1];
        // Concepts may themselves contain underscores.
        let concept = parts[2..parts.len() - 1].join("_");
        if creator.is_empty() || format.is_empty() || concept.is_empty() {
            return None;
        }

        Some(Self {
            launch_date,
            creator: creator.to_string(),
            concept,
            format: format.to_string(),
        })
    }

    pub fn launch_month(&self) -> String {
        self.launch_date.format("%Y-%m").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conventional_name() {
        let n = AdName::parse("20260105_JD_UGC-Hook_Video").unwrap();
        assert_eq!(n.launch_date, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        assert_eq!(n.creator, "JD");
        assert_eq!(n.concept, "UGC-Hook");
        assert_eq!(n.format, "Video");
        assert_eq!(n.launch_month(), "2026-01");
    }

    #[test]
    fn keeps_underscores_inside_concept() {
        let n = AdName::parse("20251230_MK_Founder_Story_v2_Reel").unwrap();
        assert_eq!(n.concept, "Founder_Story_v2");
        assert_eq!(n.format, "Reel");
    }

    #[test]
    fn rejects_free_form_names() {
        assert!(AdName::parse("Ad Creative 12").is_none());
        assert!(AdName::parse("20260105_JD_Video").is_none());
        assert!(AdName::parse("2026015_JD_Hook_Video").is_none());
        assert!(AdName::parse("20261345_JD_Hook_Video").is_none());
        assert!(AdName::parse("20260105__Hook_Video").is_none());
    }
}
