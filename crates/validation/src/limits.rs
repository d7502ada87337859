//! Size limits applied by the default validation rules.

use cardgate_storage::ConfigError;
use serde::{Deserialize, Serialize};

/// Default maximum identity length in bytes.
pub const DEFAULT_MAX_IDENTITY_LEN: usize = 256;
/// Default minimum public key length in bytes.
pub const DEFAULT_MIN_PUBLIC_KEY_LEN: usize = 16;
/// Default maximum public key length in bytes.
pub const DEFAULT_MAX_PUBLIC_KEY_LEN: usize = 2048;
/// Default maximum number of custom data entries.
pub const DEFAULT_MAX_DATA_ENTRIES: usize = 16;
/// Default maximum length of a custom data key or value.
pub const DEFAULT_MAX_DATA_ENTRY_LEN: usize = 256;
/// Default maximum length of a device info field.
pub const DEFAULT_MAX_DEVICE_INFO_LEN: usize = 256;

/// Bounds enforced on card fields.
///
/// # Validation
///
/// - every maximum must be >= 1
/// - `min_public_key_len` must not exceed `max_public_key_len`
///
/// # Examples
///
/// ```
/// use cardgate_validation::ValidationLimits;
///
/// let limits = ValidationLimits::builder().max_data_entries(4).build()?;
/// assert_eq!(limits.max_data_entries, 4);
/// # Ok::<(), cardgate_storage::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationLimits {
    /// Maximum identity length in bytes.
    pub max_identity_len: usize,
    /// Minimum public key length in bytes.
    pub min_public_key_len: usize,
    /// Maximum public key length in bytes.
    pub max_public_key_len: usize,
    /// Maximum number of custom data entries.
    pub max_data_entries: usize,
    /// Maximum length of a custom data key or value.
    pub max_data_entry_len: usize,
    /// Maximum length of a device info field.
    pub max_device_info_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_identity_len: DEFAULT_MAX_IDENTITY_LEN,
            min_public_key_len: DEFAULT_MIN_PUBLIC_KEY_LEN,
            max_public_key_len: DEFAULT_MAX_PUBLIC_KEY_LEN,
            max_data_entries: DEFAULT_MAX_DATA_ENTRIES,
            max_data_entry_len: DEFAULT_MAX_DATA_ENTRY_LEN,
            max_device_info_len: DEFAULT_MAX_DEVICE_INFO_LEN,
        }
    }
}

#[bon::bon]
impl ValidationLimits {
    /// Creates validated limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a maximum is zero or the public key bounds
    /// are inverted.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_IDENTITY_LEN)] max_identity_len: usize,
        #[builder(default = DEFAULT_MIN_PUBLIC_KEY_LEN)] min_public_key_len: usize,
        #[builder(default = DEFAULT_MAX_PUBLIC_KEY_LEN)] max_public_key_len: usize,
        #[builder(default = DEFAULT_MAX_DATA_ENTRIES)] max_data_entries: usize,
        #[builder(default = DEFAULT_MAX_DATA_ENTRY_LEN)] max_data_entry_len: usize,
        #[builder(default = DEFAULT_MAX_DEVICE_INFO_LEN)] max_device_info_len: usize,
    ) -> Result<Self, ConfigError> {
        let limits = Self {
            max_identity_len,
            min_public_key_len,
            max_public_key_len,
            max_data_entries,
            max_data_entry_len,
            max_device_info_len,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Checks the invariants listed on the type.
    ///
    /// Deserialized limits bypass the builder, so configuration loaders call
    /// this explicitly.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("max_identity_len", self.max_identity_len),
            ("max_public_key_len", self.max_public_key_len),
            ("max_data_entries", self.max_data_entries),
            ("max_data_entry_len", self.max_data_entry_len),
            ("max_device_info_len", self.max_device_info_len),
        ] {
            if value == 0 {
                return Err(ConfigError::BelowMinimum {
                    field,
                    value: "0".into(),
                    min: "1".into(),
                });
            }
        }
        if self.min_public_key_len > self.max_public_key_len {
            return Err(ConfigError::InvertedRange {
                min_field: "min_public_key_len",
                min: self.min_public_key_len.to_string(),
                max_field: "max_public_key_len",
                max: self.max_public_key_len.to_string(),
            });
        }
        Ok(())
    }
}
