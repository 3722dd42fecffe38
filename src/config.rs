//! Tunable bounds for session state.

/// Default bound on message keys derived ahead for a single message.
pub const DEFAULT_MAX_SKIP: u32 = 1000;

/// Default number of receiving chains kept per session state.
pub const DEFAULT_MAX_RECEIVER_CHAINS: usize = 5;

/// Default number of superseded session states kept per record.
pub const DEFAULT_MAX_ARCHIVED_STATES: usize = 40;

/// Skipped message keys cached per receiving chain when `max_skip` is at or
/// below this value.
pub const MAX_CACHED_MESSAGE_KEYS: usize = 2000;

/// Limits applied by [`SessionCipher`](crate::SessionCipher) and
/// [`SessionBuilder`](crate::SessionBuilder).
///
/// ```
/// use signal_session::SessionConfig;
///
/// let config = SessionConfig::default().with_max_skip(2000);
/// assert_eq!(config.max_skip, 2000);
/// assert_eq!(config.max_receiver_chains, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Skipped-key derivations a single message may cause, summed over every
    /// session state it is tried against.
    pub max_skip: u32,
    /// Receiving chains kept per state; the oldest is evicted first.
    pub max_receiver_chains: usize,
    /// Archived states kept per session record.
    pub max_archived_states: usize,
}

impl SessionConfig {
    /// Raising `max_skip` above [`MAX_CACHED_MESSAGE_KEYS`] raises the
    /// per-chain skipped-key cache with it, so a full gap stays decryptable.
    #[must_use]
    pub fn with_max_skip(mut self, max_skip: u32) -> Self {
        self.max_skip = max_skip;
        self
    }

    #[must_use]
    pub fn with_max_receiver_chains(mut self, max_receiver_chains: usize) -> Self {
        self.max_receiver_chains = max_receiver_chains.max(1);
        self
    }

    #[must_use]
    pub fn with_max_archived_states(mut self, max_archived_states: usize) -> Self {
        self.max_archived_states = max_archived_states;
        self
    }

    /// Skipped message keys kept per receiving chain.
    #[must_use]
    pub fn max_cached_message_keys(&self) -> usize {
        usize::try_from(self.max_skip)
            .unwrap_or(usize::MAX)
            .max(MAX_CACHED_MESSAGE_KEYS)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            max_receiver_chains: DEFAULT_MAX_RECEIVER_CHAINS,
            max_archived_states: DEFAULT_MAX_ARCHIVED_STATES,
        }
    }
}
