/// Emits one byte to an external observer, blocking until the channel accepts it.
pub trait ByteSink {
    fn emit_byte(&mut self, value: u8);
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn emit_byte(&mut self, value: u8) {
        (**self).emit_byte(value)
    }
}

/// One-time peripheral setup state, owned by the sink that performs the setup.
///
/// Sinks check and flip this inside the same critical section as the byte write, so
/// two contexts racing the very first byte cannot both run the setup sequence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    #[default]
    Uninitialized,
    Initialized,
}

impl InitState {
    /// Marks the state initialized. Returns `true` only on the call that performed the
    /// transition.
    pub fn claim(&mut self) -> bool {
        match self {
            InitState::Uninitialized => {
                *self = InitState::Initialized;
                true
            }
            InitState::Initialized => false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        *self == InitState::Initialized
    }

    /// Forget the setup so the next byte runs it again. Test doubles only.
    #[cfg(any(test, feature = "test-support"))]
    pub fn reset(&mut self) {
        *self = InitState::Uninitialized;
    }
}
