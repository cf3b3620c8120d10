use std::str::FromStr;
use std::time::Duration;

/// Interval written as `1h`, `30m`, `1d`, `1h15m30s` or bare seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

fn unit_seconds(unit: char) -> Option<u64> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(3600),
        'd' => Some(86400),
        _ => None,
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut total: u64 = 0;
        let mut digits = String::new();
        let mut parts = 0;

        for c in s.chars().filter(|c| !c.is_whitespace()) {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let multiplier = unit_seconds(c).ok_or_else(|| format!("invalid duration unit: {}", c))?;
            let value: u64 = digits
                .parse()
                .map_err(|_| format!("missing number before '{}'", c))?;
            total = value
                .checked_mul(multiplier)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| "duration is too large".to_string())?;
            digits.clear();
            parts += 1;
        }

        if !digits.is_empty() {
            let value: u64 = digits.parse().map_err(|_| "invalid number in duration".to_string())?;
            total = total.checked_add(value).ok_or_else(|| "duration is too large".to_string())?;
            parts += 1;
        }

        if parts == 0 {
            return Err("duration must include a number".to_string());
        }
        if total == 0 {
            return Err("duration must be greater than zero".to_string());
        }
        Ok(HumanDuration(Duration::from_secs(total)))
    }
}
