//! Separator model profiles.
//!
//! A profile names the stems a separator run produces, split into "fono"
//! (instrumental) and "non-fono" (vocal) sets, plus a default separator
//! concurrency that can be overridden per profile via environment.

/// Fixed display order for job artifacts. Names not listed here sort last,
/// original order preserved.
pub const DISPLAY_ORDER: &[&str] = &[
    "original", "fono", "vocals", "drums", "bass", "guitar", "piano", "other",
];

/// Rank of an artifact name in [`DISPLAY_ORDER`].
pub fn display_rank(name: &str) -> usize {
    DISPLAY_ORDER
        .iter()
        .position(|n| *n == name)
        .unwrap_or(DISPLAY_ORDER.len())
}

/// A named separator model profile.
#[derive(Debug)]
pub struct ModelProfile {
    pub name: &'static str,
    /// Instrumental stems, in the order they are blended into the fono track.
    pub fono: &'static [&'static str],
    /// Vocal stems.
    pub non_fono: &'static [&'static str],
    default_jobs: u32,
    jobs_env: &'static str,
}

const PROFILES: &[ModelProfile] = &[
    ModelProfile {
        name: "mdx_extra",
        fono: &["bass", "drums", "other"],
        non_fono: &["vocals"],
        default_jobs: 16,
        jobs_env: "JOBS_MDX_EXTRA",
    },
    ModelProfile {
        name: "htdemucs",
        fono: &["bass", "drums", "other"],
        non_fono: &["vocals"],
        default_jobs: 8,
        jobs_env: "JOBS_HTDEMUCS",
    },
    ModelProfile {
        name: "htdemucs_ft",
        fono: &["bass", "drums", "other"],
        non_fono: &["vocals"],
        default_jobs: 8,
        jobs_env: "JOBS_HTDEMUCS_FT",
    },
    ModelProfile {
        name: "htdemucs_6s",
        fono: &["bass", "drums", "guitar", "piano", "other"],
        non_fono: &["vocals"],
        default_jobs: 8,
        jobs_env: "JOBS_HTDEMUCS_6S",
    },
    ModelProfile {
        name: "hdemucs_mmi",
        fono: &["bass", "drums", "other"],
        non_fono: &["vocals"],
        default_jobs: 8,
        jobs_env: "JOBS_HDEMUCS_MMI",
    },
];

impl ModelProfile {
    /// All known profiles.
    pub fn all() -> &'static [ModelProfile] {
        PROFILES
    }

    /// Look up a profile by name.
    pub fn by_name(name: &str) -> Option<&'static ModelProfile> {
        PROFILES.iter().find(|p| p.name == name)
    }

    /// Names of all known profiles, for validation messages.
    pub fn names() -> Vec<&'static str> {
        PROFILES.iter().map(|p| p.name).collect()
    }

    /// All stems this profile produces (fono first, then non-fono).
    pub fn stems(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fono.iter().chain(self.non_fono.iter()).copied()
    }

    pub fn stem_count(&self) -> usize {
        self.fono.len() + self.non_fono.len()
    }

    pub fn contains_stem(&self, stem: &str) -> bool {
        self.stems().any(|s| s == stem)
    }

    /// Separator concurrency for this profile: the `jobs_env` environment
    /// override when set and parseable, otherwise the built-in default.
    pub fn separator_jobs(&self) -> u32 {
        std::env::var(self.jobs_env)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert!(ModelProfile::by_name("htdemucs").is_some());
        assert!(ModelProfile::by_name("htdemucs_6s").is_some());
        assert!(ModelProfile::by_name("nonexistent").is_none());
    }

    #[test]
    fn test_six_stem_profile() {
        let profile = ModelProfile::by_name("htdemucs_6s").unwrap();
        assert_eq!(profile.stem_count(), 6);
        assert!(profile.contains_stem("guitar"));
        assert!(profile.contains_stem("vocals"));
        assert!(!profile.contains_stem("original"));
    }

    #[test]
    fn test_stems_order_fono_first() {
        let profile = ModelProfile::by_name("htdemucs").unwrap();
        let stems: Vec<_> = profile.stems().collect();
        assert_eq!(stems, vec!["bass", "drums", "other", "vocals"]);
    }

    #[test]
    fn test_display_rank() {
        assert_eq!(display_rank("original"), 0);
        assert_eq!(display_rank("fono"), 1);
        assert_eq!(display_rank("vocals"), 2);
        assert!(display_rank("mystery") > display_rank("other"));
    }

    #[test]
    fn test_display_order_covers_all_profile_stems() {
        for profile in ModelProfile::all() {
            for stem in profile.stems() {
                assert!(
                    DISPLAY_ORDER.contains(&stem),
                    "stem {stem} of {} missing from display order",
                    profile.name
                );
            }
        }
    }
}
