//! Virtual-user-hour budgeting for hosted load-test plans.
use stampede_core::FREE_TIER_VU_HOURS;
use std::fmt;
use std::time::Duration;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VuHours {
    pub users: usize,
    pub hours: f64,
}

impl VuHours {
    pub fn new(users: usize, duration: Duration) -> Self {
        Self {
            users,
            hours: duration.as_secs_f64() / 3600.,
        }
    }

    pub fn total(&self) -> f64 {
        self.users as f64 * self.hours
    }

    pub fn percent_of_free_tier(&self) -> f64 {
        self.total() / FREE_TIER_VU_HOURS * 100.
    }

    pub fn exceeds_free_tier(&self) -> bool {
        self.total() > FREE_TIER_VU_HOURS
    }

    /// Most users that fit the free tier at this duration.
    pub fn max_users(&self) -> usize {
        if self.hours > 0. {
            (FREE_TIER_VU_HOURS / self.hours) as usize
        } else {
            usize::MAX
        }
    }

    /// Longest run, in hours, that fits the free tier at this user count.
    pub fn max_hours(&self) -> f64 {
        if self.users > 0 {
            FREE_TIER_VU_HOURS / self.users as f64
        } else {
            f64::INFINITY
        }
    }
}

impl fmt::Display for VuHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VU Hours Calculation:")?;
        writeln!(f, "   Users: {}", self.users)?;
        writeln!(f, "   Duration: {:.2} hours", self.hours)?;
        writeln!(f, "   VU Hours: {:.1}", self.total())?;
        writeln!(f)?;
        writeln!(f, "Free Tier: {FREE_TIER_VU_HOURS:.0} VU hours/month")?;
        write!(
            f,
            "This test: {:.1} VU hours ({:.1}% of free tier)",
            self.total(),
            self.percent_of_free_tier()
        )?;
        if self.exceeds_free_tier() {
            writeln!(f)?;
            writeln!(f, "This exceeds the free tier. Consider:")?;
            writeln!(f, "   - Reduce users to {}", self.max_users())?;
            write!(f, "   - Reduce duration to {:.1}h", self.max_hours())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_free_tier() {
        let calc = VuHours::new(50, Duration::from_secs(2 * 3600));
        assert_eq!(calc.total(), 100.);
        assert_eq!(calc.percent_of_free_tier(), 50.);
        assert!(!calc.exceeds_free_tier());
        assert!(!calc.to_string().contains("Consider"));
    }

    #[test]
    fn over_free_tier_suggests_limits() {
        let calc = VuHours::new(100, Duration::from_secs(3 * 3600));
        assert!(calc.exceeds_free_tier());
        assert_eq!(calc.max_users(), 66);
        assert_eq!(calc.max_hours(), 2.);

        let out = calc.to_string();
        assert!(out.contains("VU Hours: 300.0"));
        assert!(out.contains("Reduce users to 66"));
        assert!(out.contains("Reduce duration to 2.0h"));
    }

    #[test]
    fn minutes_count_fractionally() {
        let calc = VuHours::new(10, Duration::from_secs(90 * 60));
        assert_eq!(calc.hours, 1.5);
        assert_eq!(calc.total(), 15.);
    }
}
