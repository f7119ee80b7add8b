//! Cronjob normalization: duplicate detection, in-pod/native classification,
//! Kubernetes-safe naming, and namespace-seeded schedules.

use crate::CoreError;
use berth_schema::CronjobDeclaration;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Native cronjobs can not run more often than this many minutes apart.
const MIN_NATIVE_INTERVAL: u32 = 15;
const MAX_NATIVE_NAME_LEN: usize = 52;
const TRUNCATED_NAME_LEN: usize = 45;
const NAME_HASH_LEN: usize = 6;

static NAME_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9]+").expect("separator pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cronjob {
    pub name: String,
    pub schedule: String,
    pub command: String,
    pub service: String,
    pub in_pod: bool,
}

/// Fail when a cronjob name appears more than once. The error lists every
/// repeated entry followed by the first declaration it collides with.
pub fn check_duplicates(cronjobs: &[CronjobDeclaration]) -> Result<(), CoreError> {
    let mut unique: Vec<&CronjobDeclaration> = Vec::new();
    let mut duplicates: Vec<&CronjobDeclaration> = Vec::new();
    for cronjob in cronjobs {
        if unique.iter().any(|u| u.name == cronjob.name) {
            duplicates.push(cronjob);
        } else {
            unique.push(cronjob);
        }
    }
    if duplicates.is_empty() {
        return Ok(());
    }
    let originals: Vec<&CronjobDeclaration> = duplicates
        .iter()
        .flat_map(|d| unique.iter().filter(move |u| u.name == d.name))
        .copied()
        .collect();
    let entries: Vec<&CronjobDeclaration> = duplicates.into_iter().chain(originals).collect();
    Err(CoreError::DuplicateCronjobs {
        entries: serde_json::to_string(&entries)?,
    })
}

/// Seed for schedule randomization, stable for a namespace.
pub fn schedule_seed(namespace: &str) -> u64 {
    let hash = blake3::hash(namespace.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Classify and rewrite one declared cronjob for the service owning it.
pub fn normalize(
    cronjob: &CronjobDeclaration,
    override_name: &str,
    seed: u64,
) -> Result<Cronjob, CoreError> {
    let invalid = |reason: String| CoreError::InvalidSchedule {
        cronjob: cronjob.name.clone(),
        reason,
    };
    let schedule = convert_schedule(seed, &cronjob.schedule).map_err(invalid)?;
    let in_pod = is_in_pod(&schedule).map_err(invalid)?;
    let name = if in_pod {
        cronjob.name.clone()
    } else {
        native_name(override_name, &cronjob.name)
    };
    Ok(Cronjob {
        name,
        schedule,
        command: cronjob.command.clone(),
        service: cronjob.service.clone(),
        in_pod,
    })
}

/// `cronjob-<override>-<name>` with every run of non-alphanumerics collapsed
/// to one `-`, shortened with a hash suffix past 52 characters.
pub fn native_name(override_name: &str, name: &str) -> String {
    let raw = format!("cronjob-{override_name}-{}", name.to_lowercase());
    let slug = NAME_SEPARATOR_RE.replace_all(&raw, "-");
    if slug.len() <= MAX_NATIVE_NAME_LEN {
        return slug.into_owned();
    }
    let hash = blake3::hash(slug.as_bytes()).to_hex();
    format!(
        "{}-{}",
        &slug[..TRUNCATED_NAME_LEN],
        &hash[..NAME_HASH_LEN]
    )
}

fn split_fields(schedule: &str) -> Result<Vec<&str>, String> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "expected 5 fields in '{schedule}', found {}",
            fields.len()
        ));
    }
    Ok(fields)
}

fn parse_number(value: &str) -> Result<u32, String> {
    value
        .parse::<u32>()
        .map_err(|_| format!("'{value}' is not a number"))
}

/// True when the schedule fires more often than native cronjobs allow, so the
/// job has to run inside the service's pod. Minute placeholders are
/// classified as if seeded with zero.
pub fn is_in_pod(schedule: &str) -> Result<bool, String> {
    let fields = split_fields(schedule)?;
    let minutes = firing_minutes(&convert_minute(fields[0], 0)?)?;
    let (Some(&first), Some(&last)) = (minutes.first(), minutes.last()) else {
        return Ok(false);
    };
    // The gap from the last firing of one hour to the first of the next.
    if first + 60 - last < MIN_NATIVE_INTERVAL {
        return Ok(true);
    }
    Ok(minutes
        .windows(2)
        .any(|pair| pair[1] - pair[0] < MIN_NATIVE_INTERVAL))
}

/// Sorted, deduplicated minutes a minute field fires at within one hour.
fn firing_minutes(field: &str) -> Result<Vec<u32>, String> {
    validate_field(field, 0, 59)?;
    let mut minutes = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(parse_number(step)?)),
            None => (part, None),
        };
        let (start, end) = match (range, range.split_once('-')) {
            ("*", _) => (0, 59),
            (_, Some((start, end))) => (parse_number(start)?, parse_number(end)?),
            (_, None) => {
                let start = parse_number(range)?;
                (start, if step.is_some() { 59 } else { start })
            }
        };
        minutes.extend((start..=end).step_by(step.unwrap_or(1) as usize));
    }
    minutes.sort_unstable();
    minutes.dedup();
    Ok(minutes)
}

/// Replace the `M`/`H` placeholders with values derived from `seed`, then
/// validate the result.
///
/// - minute `M` or `H`: one minute in 0-59
/// - minute `M/N`, `H/N`, `*/N`: every N minutes from a seeded offset
/// - hour `H`: one hour in 0-23; `H(a-b)`: one hour in the range; `H/N`:
///   every N hours from a seeded offset
pub fn convert_schedule(seed: u64, schedule: &str) -> Result<String, String> {
    let fields = split_fields(schedule)?;
    let minute = convert_minute(fields[0], seed)?;
    let hour = convert_hour(fields[1], seed)?;
    let converted = [
        minute.as_str(),
        hour.as_str(),
        fields[2],
        fields[3],
        fields[4],
    ];
    for (field, (name, min, max)) in converted.iter().zip(FIELD_BOUNDS) {
        validate_field(field, min, max).map_err(|e| format!("invalid {name} field: {e}"))?;
    }
    Ok(converted.join(" "))
}

const FIELD_BOUNDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day of month", 1, 31),
    ("month", 1, 12),
    ("day of week", 0, 7),
];

#[allow(clippy::cast_possible_truncation)]
fn seeded(seed: u64, modulus: u32) -> u32 {
    (seed % u64::from(modulus)) as u32
}

fn stepped_list(start: u32, step: u32, limit: u32) -> String {
    (start..limit)
        .step_by(step as usize)
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_step(step: &str, limit: u32) -> Result<u32, String> {
    let step = parse_number(step)?;
    if step == 0 || step >= limit {
        return Err(format!("step {step} out of range 1-{}", limit - 1));
    }
    Ok(step)
}

fn convert_minute(field: &str, seed: u64) -> Result<String, String> {
    match field {
        "M" | "H" => Ok(seeded(seed, 60).to_string()),
        _ => match field.split_once('/') {
            Some(("M" | "H" | "*", step)) => {
                let step = parse_step(step, 60)?;
                Ok(stepped_list(seeded(seed, step), step, 60))
            }
            _ => Ok(field.to_owned()),
        },
    }
}

fn convert_hour(field: &str, seed: u64) -> Result<String, String> {
    if field == "H" {
        return Ok(seeded(seed, 24).to_string());
    }
    if let Some(range) = field.strip_prefix("H(").and_then(|r| r.strip_suffix(')')) {
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| format!("'{field}' is not an hour range"))?;
        let (start, end) = (parse_number(start)?, parse_number(end)?);
        if start > end || end > 23 {
            return Err(format!("'{field}' is not an hour range"));
        }
        return Ok((start + seeded(seed, end - start + 1)).to_string());
    }
    if let Some(step) = field.strip_prefix("H/") {
        let step = parse_step(step, 24)?;
        return Ok(stepped_list(seeded(seed, step), step, 24));
    }
    Ok(field.to_owned())
}

fn validate_field(field: &str, min: u32, max: u32) -> Result<(), String> {
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };
        if let Some(step) = step {
            if parse_number(step)? == 0 {
                return Err(format!("zero step in '{part}'"));
            }
        }
        if range == "*" {
            continue;
        }
        let (start, end) = match range.split_once('-') {
            Some((start, end)) => (parse_number(start)?, parse_number(end)?),
            None => {
                let value = parse_number(range)?;
                (value, value)
            }
        };
        if start < min || end > max || start > end {
            return Err(format!("'{part}' outside {min}-{max}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, schedule: &str) -> CronjobDeclaration {
        CronjobDeclaration {
            name: name.to_owned(),
            schedule: schedule.to_owned(),
            command: "drush cron".to_owned(),
            service: "cli".to_owned(),
        }
    }

    #[test]
    fn classifies_frequent_schedules_as_in_pod() {
        assert!(is_in_pod("* * * * *").unwrap());
        assert!(is_in_pod("*/5 * * * *").unwrap());
        assert!(is_in_pod("M/10 * * * *").unwrap());
        assert!(is_in_pod("0,10,30 * * * *").unwrap());
        assert!(!is_in_pod("*/15 * * * *").unwrap());
        assert!(!is_in_pod("M * * * *").unwrap());
        assert!(!is_in_pod("0,30 * * * *").unwrap());
        assert!(!is_in_pod("5 H * * *").unwrap());
        assert!(!is_in_pod("10,40 * * * *").unwrap());
    }

    #[test]
    fn classifies_mixed_minute_lists() {
        assert!(is_in_pod("0,15-20 * * * *").unwrap());
        assert!(is_in_pod("0-10/5,30 * * * *").unwrap());
        assert!(!is_in_pod("0-30/30,45 * * * *").unwrap());
        assert!(is_in_pod("5/20,59 * * * *").unwrap());
        assert!(is_in_pod("0,75 * * * *").is_err());
    }

    #[test]
    fn minute_gaps_wrap_into_the_next_hour() {
        assert!(is_in_pod("0,50 * * * *").unwrap());
        assert!(is_in_pod("*/25 * * * *").unwrap());
        assert!(!is_in_pod("*/20 * * * *").unwrap());
        assert!(!is_in_pod("50 * * * *").unwrap());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(is_in_pod("* * *").is_err());
        assert!(convert_schedule(1, "M * * * * *").is_err());
    }

    #[test]
    fn converts_placeholders_deterministically() {
        let seed = schedule_seed("example-project-main");
        let first = convert_schedule(seed, "M H * * *").unwrap();
        let second = convert_schedule(seed, "M H * * *").unwrap();
        assert_eq!(first, second);
        let fields: Vec<u32> = first
            .split(' ')
            .take(2)
            .map(|f| f.parse().unwrap())
            .collect();
        assert!(fields[0] < 60);
        assert!(fields[1] < 24);
    }

    #[test]
    fn converts_stepped_minutes_to_lists() {
        assert_eq!(convert_schedule(7, "M/15 * * * *").unwrap(), "7,22,37,52 * * * *");
        assert_eq!(convert_schedule(3, "*/30 * * * *").unwrap(), "3,33 * * * *");
    }

    #[test]
    fn converts_hour_ranges() {
        assert_eq!(convert_schedule(5, "0 H(2-4) * * *").unwrap(), "0 4 * * *");
        assert_eq!(convert_schedule(13, "0 H/6 * * *").unwrap(), "0 1,7,13,19 * * *");
    }

    #[test]
    fn keeps_literal_schedules() {
        assert_eq!(
            convert_schedule(42, "15 2,14 1-15 * 0").unwrap(),
            "15 2,14 1-15 * 0"
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(convert_schedule(1, "61 * * * *").is_err());
        assert!(convert_schedule(1, "0 24 * * *").is_err());
        assert!(convert_schedule(1, "0 * 0 * *").is_err());
        assert!(convert_schedule(1, "0 * * * MON").is_err());
        assert!(convert_schedule(1, "0 H(5-2) * * *").is_err());
    }

    #[test]
    fn native_names_are_slugified() {
        assert_eq!(native_name("cli", "Drush Cron"), "cronjob-cli-drush-cron");
        assert_eq!(
            native_name("cli", "drush -- cron!!"),
            "cronjob-cli-drush-cron-"
        );
    }

    #[test]
    fn long_native_names_are_truncated_with_hash() {
        let long = "a very long cronjob name that goes well past the limit";
        let name = native_name("nginx-php", long);
        assert_eq!(name.len(), 52);
        assert!(name.starts_with("cronjob-nginx-php-a-very-long-cronjob-name-th-"));
        assert_eq!(name, native_name("nginx-php", long));
    }

    #[test]
    fn normalize_native_and_in_pod() {
        let seed = schedule_seed("example-project-main");
        let native = normalize(&decl("Drush cron", "M * * * *"), "cli", seed).unwrap();
        assert!(!native.in_pod);
        assert_eq!(native.name, "cronjob-cli-drush-cron");

        let in_pod = normalize(&decl("every five", "*/5 * * * *"), "cli", seed).unwrap();
        assert!(in_pod.in_pod);
        assert_eq!(in_pod.name, "every five");
    }

    #[test]
    fn normalize_accepts_mixed_minute_lists() {
        let job = normalize(&decl("mixed", "0,15-20 * * * *"), "cli", 1).unwrap();
        assert!(job.in_pod);
        assert_eq!(job.name, "mixed");
        assert_eq!(job.schedule, "0,15-20 * * * *");

        let hourly = normalize(&decl("twice hourly", "10,40 * * * *"), "cli", 1).unwrap();
        assert!(!hourly.in_pod);
        assert_eq!(hourly.name, "cronjob-cli-twice-hourly");
    }

    #[test]
    fn invalid_schedule_names_the_cronjob() {
        let err = normalize(&decl("broken", "every minute"), "cli", 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSchedule { cronjob, .. } if cronjob == "broken"));
    }

    #[test]
    fn duplicates_are_listed() {
        let cronjobs = vec![
            decl("drush cron", "M * * * *"),
            decl("other", "M * * * *"),
            decl("drush cron", "M/30 * * * *"),
        ];
        let err = check_duplicates(&cronjobs).unwrap_err();
        let CoreError::DuplicateCronjobs { entries } = err else {
            panic!("unexpected error");
        };
        let listed: Vec<CronjobDeclaration> = serde_json::from_str(&entries).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].schedule, "M/30 * * * *");
        assert_eq!(listed[1].schedule, "M * * * *");
        assert!(check_duplicates(&cronjobs[..2]).is_ok());
    }
}
