/// Whole-second duration split into hours, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hms {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Hms {
    pub fn from_seconds(total: u64) -> Self {
        let hours = total / 3600;
        let rest = total % 3600;
        Self {
            hours,
            minutes: rest / 60,
            seconds: rest % 60,
        }
    }
}

/// Render a second count as `H hours, M minutes, S seconds`.
pub fn seconds_to_time_string(total: u64) -> String {
    let hms = Hms::from_seconds(total);
    format!(
        "{} hours, {} minutes, {} seconds",
        hms.hours, hms.minutes, hms.seconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_3725_seconds() {
        assert_eq!(
            Hms::from_seconds(3725),
            Hms {
                hours: 1,
                minutes: 2,
                seconds: 5
            }
        );
        assert_eq!(seconds_to_time_string(3725), "1 hours, 2 minutes, 5 seconds");
    }

    #[test]
    fn zero_renders_all_components() {
        assert_eq!(seconds_to_time_string(0), "0 hours, 0 minutes, 0 seconds");
    }

    #[test]
    fn hours_do_not_wrap_at_a_day() {
        let hms = Hms::from_seconds(90_061);
        assert_eq!((hms.hours, hms.minutes, hms.seconds), (25, 1, 1));
    }
}
