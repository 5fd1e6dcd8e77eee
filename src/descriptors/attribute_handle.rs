use core::num::NonZeroU16;
use core::fmt::Display;
use core::fmt::Formatter;

/// Opaque handle the GATT server assigns to each characteristic and descriptor.  Events refer to
/// attributes by handle, never by UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeHandle(pub NonZeroU16);

impl AttributeHandle {
  pub fn value(&self) -> u16 {
    self.0.get()
  }
}

impl Display for AttributeHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "{:#06x}", self.0.get())
  }
}
