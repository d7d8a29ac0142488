use rand::distributions::Alphanumeric;
use rand::Rng;

pub const DEFAULT_PREFIX: &str = "FR-";
pub const SUFFIX_LEN: usize = 8;

/// Issues human-readable booking references: prefix + 8 alphanumerics.
///
/// 62^8 suffixes keep random collisions negligible; the store still rejects a
/// duplicate and the coordinator draws again.
#[derive(Debug, Clone)]
pub struct ReferenceGenerator {
    prefix: String,
}

impl ReferenceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn generate(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        format!("{}{}", self.prefix, suffix)
    }

    /// Whether `reference` has the shape this generator produces.
    pub fn is_well_formed(&self, reference: &str) -> bool {
        reference
            .strip_prefix(self.prefix.as_str())
            .map_or(false, |suffix| {
                suffix.len() == SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_alphanumeric())
            })
    }
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_reference_format() {
        let generator = ReferenceGenerator::default();
        let reference = generator.generate();

        assert!(reference.starts_with("FR-"));
        assert_eq!(reference.len(), 11);
        assert!(generator.is_well_formed(&reference));
        assert!(!generator.is_well_formed("FR-abc"));
        assert!(!generator.is_well_formed("XX-ABCDEFGH"));
        assert!(!generator.is_well_formed("FR-ABCD-FGH"));
    }

    #[test]
    fn test_references_are_unique() {
        let generator = ReferenceGenerator::default();
        let references: HashSet<String> = (0..10_000).map(|_| generator.generate()).collect();

        assert_eq!(references.len(), 10_000);
        assert!(references.iter().all(|r| generator.is_well_formed(r)));
    }
}
