//! BlipChat Harness
//!
//! In-memory radio medium and scenario helpers for exercising BlipChat
//! sessions without Bluetooth hardware.
//!
//! ```rust,ignore
//! let air = VirtualAir::new();
//! let a = TestNode::new(&air, "a", NodeProfile::conformant()).await;
//! let mut b = TestNode::new(&air, "b", NodeProfile::conformant()).await;
//! a.start().await?;
//! b.start().await?;
//! a.wait_for_peer(&b.address).await;
//! a.session.send(b"hello".to_vec()).await?;
//! assert_eq!(b.next_message().await, b"hello");
//! ```

pub mod air;
pub mod node;

pub use air::{AirStats, NodeProfile, VirtualAir, VirtualRadio};
pub use node::{test_identity, TestNode, SETTLE_TIMEOUT, TEST_CHARACTERISTIC, TEST_SERVICE};
