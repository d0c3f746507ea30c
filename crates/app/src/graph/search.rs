//! Fuzzy name scoring for device lookup.
//!
//! The scoring ladder is a hard contract: exact name 1000, name prefix 500,
//! name substring 250; alias exact/prefix/substring 900/400/200 (consulted
//! only when the name itself does not match at all); otherwise Levenshtein
//! distance ≤ 3 over the name and aliases scores `100 − 20×distance`.
//! A score of zero means "no match".

use unihub_domain::device::Device;

pub(crate) const EXACT_NAME: u32 = 1000;
pub(crate) const PREFIX_NAME: u32 = 500;
pub(crate) const SUBSTRING_NAME: u32 = 250;
pub(crate) const EXACT_ALIAS: u32 = 900;
pub(crate) const PREFIX_ALIAS: u32 = 400;
pub(crate) const SUBSTRING_ALIAS: u32 = 200;
const MAX_EDIT_DISTANCE: usize = 3;

/// Score a device against a lowercased query.
#[must_use]
pub fn score_device(device: &Device, query: &str) -> u32 {
    let name = device.name.to_lowercase();
    if let Some(score) = score_text(&name, query, EXACT_NAME, PREFIX_NAME, SUBSTRING_NAME) {
        return score;
    }

    let mut best_alias = 0;
    for alias in &device.aliases {
        let alias = alias.to_lowercase();
        if let Some(score) =
            score_text(&alias, query, EXACT_ALIAS, PREFIX_ALIAS, SUBSTRING_ALIAS)
        {
            best_alias = best_alias.max(score);
        }
    }
    if best_alias > 0 {
        return best_alias;
    }

    let mut distance = levenshtein(&name, query);
    for alias in &device.aliases {
        distance = distance.min(levenshtein(&alias.to_lowercase(), query));
    }
    if distance <= MAX_EDIT_DISTANCE {
        100 - 20 * u32::try_from(distance).unwrap_or(0)
    } else {
        0
    }
}

fn score_text(text: &str, query: &str, exact: u32, prefix: u32, substring: u32) -> Option<u32> {
    if text == query {
        Some(exact)
    } else if text.starts_with(query) {
        Some(prefix)
    } else if text.contains(query) {
        Some(substring)
    } else {
        None
    }
}

/// Classic two-row Levenshtein distance over Unicode scalar values.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use unihub_domain::device::DeviceType;

    fn device(name: &str, aliases: &[&str]) -> Device {
        let mut builder = Device::builder()
            .name(name)
            .adapter_id("test")
            .native_id(name.to_lowercase().replace(' ', "_"))
            .device_type(DeviceType::Light)
            .capability(unihub_domain::capability::Capability::unknown(
                unihub_domain::capability::CapabilityType::Switch,
            ));
        for alias in aliases {
            builder = builder.alias(*alias);
        }
        builder.build().unwrap()
    }

    #[test]
    fn should_compute_levenshtein_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("lamp", "lam"), 1);
    }

    #[test]
    fn should_score_exact_name_highest() {
        let d = device("Kitchen Light", &[]);
        assert_eq!(score_device(&d, "kitchen light"), EXACT_NAME);
    }

    #[test]
    fn should_score_name_prefix_and_substring() {
        let d = device("Kitchen Light", &[]);
        assert_eq!(score_device(&d, "kitchen"), PREFIX_NAME);
        assert_eq!(score_device(&d, "light"), SUBSTRING_NAME);
    }

    #[test]
    fn should_score_alias_matches_below_name_matches() {
        let d = device("Kitchen Light", &["cooker lamp"]);
        assert_eq!(score_device(&d, "cooker lamp"), EXACT_ALIAS);
        assert_eq!(score_device(&d, "cooker"), PREFIX_ALIAS);
        assert_eq!(score_device(&d, "lamp"), SUBSTRING_ALIAS);
    }

    #[test]
    fn should_prefer_name_score_over_stronger_alias_match() {
        // name substring-matches (250), alias exact-matches (900):
        // the name score wins because a name score exists at all.
        let d = device("Kitchen Light", &["light"]);
        assert_eq!(score_device(&d, "light"), SUBSTRING_NAME);
    }

    #[test]
    fn should_fall_back_to_levenshtein_within_distance_three() {
        let d = device("Lamp", &[]);
        assert_eq!(score_device(&d, "lamps"), 80); // distance 1
        assert_eq!(score_device(&d, "lump"), 80); // distance 1
        assert_eq!(score_device(&d, "mump"), 60); // distance 2
    }

    #[test]
    fn should_score_zero_beyond_distance_three() {
        let d = device("Lamp", &[]);
        assert_eq!(score_device(&d, "thermostat"), 0);
    }

    #[test]
    fn should_use_closest_of_name_and_aliases_for_distance() {
        let d = device("Ceiling Fixture", &["lamp"]);
        // "lamps" is distance 1 from the alias
        assert_eq!(score_device(&d, "lamps"), 80);
    }
}
