//! Configuration access port trait.

use std::time::Duration;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Millisecond duration; missing, non-numeric or non-positive values use `default`.
    fn get_positive_millis(&self, section: &str, key: &str, default: Duration) -> Duration {
        match self.get_int(section, key, 0) {
            ms if ms > 0 => Duration::from_millis(ms as u64),
            _ => default,
        }
    }

    /// Section names starting with `prefix`, e.g. every `provider.*` section.
    fn sections_with_prefix(&self, prefix: &str) -> Vec<String>;
}
