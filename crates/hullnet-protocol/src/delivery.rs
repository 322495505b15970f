//! Delivery guarantees a caller can ask for.

use hullnet_transport::NativeDelivery;

/// How hard the transport should try to deliver a message.
///
/// The peer maps each method onto a [`NativeDelivery`]; a transport may
/// then upgrade that (see `Transport::effective_delivery`), which is
/// always allowed because every method's contract is a subset of the
/// next one's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryMethod {
    /// May be dropped or reordered. Never blocks the sender.
    Unreliable,
    /// Eventually delivered while the connection lives. No ordering.
    Reliable,
    /// Eventually delivered, and handed to the receiver in send order.
    #[default]
    ReliableOrdered,
}

impl DeliveryMethod {
    pub fn native(self) -> NativeDelivery {
        match self {
            Self::Unreliable => NativeDelivery::Unreliable,
            Self::Reliable => NativeDelivery::ReliableUnordered,
            Self::ReliableOrdered => NativeDelivery::ReliableOrdered,
        }
    }
}

impl From<DeliveryMethod> for NativeDelivery {
    fn from(method: DeliveryMethod) -> Self {
        method.native()
    }
}
