//! Buffers storing values that no taker has consumed yet.
//!
//! A [`Buffer`] is the pluggable storage behind every channel. The channel
//! only relies on the FIFO contract; what happens when a bounded buffer is
//! full is the buffer's own policy:
//!
//! | Constructor | Policy when full |
//! |-------------|------------------|
//! | [`none`] | stores nothing, every value is discarded |
//! | [`fixed`] | refuses the value with [`BufferError::Overflow`] |
//! | [`dropping`] | silently drops the incoming value |
//! | [`sliding`] | drops the oldest stored value |
//! | [`expanding`] | doubles its capacity |
//!
//! # Examples
//!
//! ```rust
//! use sagaflow::buffer;
//! use sagaflow::value::Value;
//!
//! let mut window = buffer::sliding(2);
//! for number in 1..=3 {
//!     window.put(Value::from(number)).unwrap();
//! }
//! assert_eq!(window.flush(), vec![Value::from(2), Value::from(3)]);
//! ```

use std::collections::VecDeque;

use crate::error::BufferError;
use crate::value::Value;

/// The capacity used by channels created without an explicit buffer.
pub const DEFAULT_LIMIT: usize = 10;

/// FIFO storage for values not yet consumed.
pub trait Buffer {
    /// Returns `true` if no value is stored.
    fn is_empty(&self) -> bool;

    /// Offers a value to the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Overflow`] when the policy refuses the value.
    fn put(&mut self, value: Value) -> Result<(), BufferError>;

    /// Removes and returns the oldest stored value.
    fn take(&mut self) -> Option<Value>;

    /// Removes and returns every stored value, oldest first.
    fn flush(&mut self) -> Vec<Value>;
}

// =============================================================================
// Zero Buffer
// =============================================================================

/// A buffer that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroBuffer;

impl Buffer for ZeroBuffer {
    fn is_empty(&self) -> bool {
        true
    }

    fn put(&mut self, _value: Value) -> Result<(), BufferError> {
        Ok(())
    }

    fn take(&mut self) -> Option<Value> {
        None
    }

    fn flush(&mut self) -> Vec<Value> {
        Vec::new()
    }
}

// =============================================================================
// Ring Buffer
// =============================================================================

/// What a [`RingBuffer`] does with a value offered while it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Refuse the value with an error.
    Throw,
    /// Drop the incoming value.
    Drop,
    /// Drop the oldest stored value to make room.
    Slide,
    /// Double the capacity.
    Expand,
}

/// A bounded FIFO buffer with a configurable overflow policy.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    items: VecDeque<Value>,
    limit: usize,
    policy: OverflowPolicy,
}

impl RingBuffer {
    /// Creates an empty buffer holding at most `limit` values.
    pub fn new(limit: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::with_capacity(limit),
            limit,
            policy,
        }
    }

    /// The current capacity.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// The number of stored values.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl Buffer for RingBuffer {
    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn put(&mut self, value: Value) -> Result<(), BufferError> {
        if self.items.len() < self.limit {
            self.items.push_back(value);
            return Ok(());
        }
        match self.policy {
            OverflowPolicy::Throw => return Err(BufferError::Overflow { limit: self.limit }),
            OverflowPolicy::Drop => {}
            OverflowPolicy::Slide => {
                if self.limit > 0 {
                    self.items.pop_front();
                    self.items.push_back(value);
                }
            }
            OverflowPolicy::Expand => {
                self.limit = (self.limit * 2).max(1);
                self.items.reserve(self.limit - self.items.len());
                self.items.push_back(value);
            }
        }
        Ok(())
    }

    fn take(&mut self) -> Option<Value> {
        self.items.pop_front()
    }

    fn flush(&mut self) -> Vec<Value> {
        self.items.drain(..).collect()
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// A buffer discarding every value.
pub fn none() -> Box<dyn Buffer> {
    Box::new(ZeroBuffer)
}

/// A buffer of `limit` values refusing overflow with an error.
pub fn fixed(limit: usize) -> Box<dyn Buffer> {
    Box::new(RingBuffer::new(limit, OverflowPolicy::Throw))
}

/// A buffer of `limit` values dropping incoming values when full.
pub fn dropping(limit: usize) -> Box<dyn Buffer> {
    Box::new(RingBuffer::new(limit, OverflowPolicy::Drop))
}

/// A buffer of `limit` values dropping the oldest value when full.
pub fn sliding(limit: usize) -> Box<dyn Buffer> {
    Box::new(RingBuffer::new(limit, OverflowPolicy::Slide))
}

/// A buffer starting at `initial` values that grows when full.
pub fn expanding(initial: usize) -> Box<dyn Buffer> {
    Box::new(RingBuffer::new(initial, OverflowPolicy::Expand))
}
