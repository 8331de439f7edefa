//! [`Message`] — the input to a single call/create frame.

use alloy_primitives::{Address, Bytes, U256};

/// The kind of call/create frame a [`Message`] requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// A normal `CALL`: executes in the callee's own context.
    Call,
    /// `CALLCODE`: executes the callee's code in the caller's storage/address context.
    CallCode,
    /// `DELEGATECALL`: as `CallCode`, additionally forwarding the original caller and value.
    DelegateCall,
    /// `STATICCALL`: as `Call`, forbidding any state mutation in the subtree.
    StaticCall,
    /// `CREATE`: deploys a new contract at a nonce-derived address.
    Create,
    /// `CREATE2`: deploys a new contract at a salt-derived address.
    Create2,
}

impl CallKind {
    /// Whether frames of this kind forbid state mutation.
    pub const fn is_static(self) -> bool {
        matches!(self, Self::StaticCall)
    }

    /// Whether this kind executes code at the caller's own storage address rather than the
    /// callee's (`CALLCODE`/`DELEGATECALL`).
    pub const fn executes_in_caller_context(self) -> bool {
        matches!(self, Self::CallCode | Self::DelegateCall)
    }

    /// Whether this kind deploys new code rather than invoking existing code.
    pub const fn is_create(self) -> bool {
        matches!(self, Self::Create | Self::Create2)
    }
}

/// The input to a call or create frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The kind of frame being entered.
    pub kind: CallKind,
    /// The frame's depth in the call stack (the root transaction frame is depth 0).
    pub depth: u32,
    /// The gas budget available to this frame.
    pub gas_limit: u64,
    /// The account whose context triggered this frame (`CALLER` inside it, absent
    /// `DELEGATECALL` forwarding).
    pub sender: Address,
    /// The account whose storage this frame reads and writes (`ADDRESS` inside it).
    pub recipient: Address,
    /// The account whose code this frame executes (differs from `recipient` for
    /// `CALLCODE`/`DELEGATECALL`).
    pub code_address: Address,
    /// The value transferred into `recipient` (zero for `DelegateCall`/`StaticCall`/`CallCode`
    /// without an explicit transfer, and for `Create`/`Create2` unless funded).
    pub value: U256,
    /// The calldata (for `Call`-family) or init code (for `Create`-family).
    pub input: Bytes,
    /// Whether this frame and its descendants run under static-context enforcement.
    pub is_static: bool,
}

impl Message {
    /// Builds the root frame for a transaction's top-level call or contract creation.
    pub fn top_level(
        kind: CallKind,
        sender: Address,
        recipient: Address,
        value: U256,
        input: Bytes,
        gas_limit: u64,
    ) -> Self {
        Self {
            kind,
            depth: 0,
            gas_limit,
            sender,
            recipient,
            code_address: recipient,
            value,
            input,
            is_static: false,
        }
    }

    /// Builds a child frame one level deeper than `self`, inheriting static-context enforcement.
    pub fn child(
        &self,
        kind: CallKind,
        recipient: Address,
        code_address: Address,
        value: U256,
        input: Bytes,
        gas_limit: u64,
    ) -> Self {
        Self {
            kind,
            depth: self.depth + 1,
            gas_limit,
            sender: if kind == CallKind::DelegateCall { self.sender } else { self.recipient },
            recipient,
            code_address,
            value,
            input,
            is_static: self.is_static || kind.is_static(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn child_inherits_static_context() {
        let root = Message::top_level(
            CallKind::StaticCall,
            address!("0000000000000000000000000000000000000001"),
            address!("0000000000000000000000000000000000000002"),
            U256::ZERO,
            Bytes::new(),
            100_000,
        );
        let child = root.child(
            CallKind::Call,
            address!("0000000000000000000000000000000000000003"),
            address!("0000000000000000000000000000000000000003"),
            U256::ZERO,
            Bytes::new(),
            1000,
        );
        assert!(child.is_static);
        assert_eq!(child.depth, 1);
    }

    #[test]
    fn delegatecall_forwards_original_sender() {
        let root = Message::top_level(
            CallKind::Call,
            address!("0000000000000000000000000000000000000001"),
            address!("0000000000000000000000000000000000000002"),
            U256::ZERO,
            Bytes::new(),
            100_000,
        );
        let child = root.child(
            CallKind::DelegateCall,
            root.recipient,
            address!("0000000000000000000000000000000000000003"),
            U256::ZERO,
            Bytes::new(),
            1000,
        );
        assert_eq!(child.sender, root.sender);
    }
}
