//! Call frame handed to precompiles and the interpreter.

use corevm_primitives::{Address, Hash, Wei, EMPTY_CODE_HASH};

/// One executing frame: whose code runs, in whose storage context, with
/// how much gas.
///
/// Frames only live for the duration of one dispatcher invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    /// `msg.sender` as seen by the running code.
    pub caller: Address,
    /// Account whose storage and balance the code operates on.
    pub address: Address,
    /// Account the code was loaded from, when it differs from `address`
    /// or may be a precompile.
    pub code_address: Option<Address>,
    pub code: Vec<u8>,
    pub code_hash: Hash,
    /// `msg.value` as seen by the running code.
    pub value: Wei,
    /// Remaining gas.
    pub gas: u64,
    /// Set for delegate calls, which inherit caller and value.
    pub delegate: bool,
}

impl Contract {
    /// Frame without code yet.
    pub fn new(caller: Address, address: Address, value: Wei, gas: u64) -> Self {
        Self {
            caller,
            address,
            code_address: None,
            code: Vec::new(),
            code_hash: EMPTY_CODE_HASH,
            value,
            gas,
            delegate: false,
        }
    }

    /// Turn the frame into a delegate frame of `parent`: the caller and
    /// value of the parent are inherited.
    pub fn as_delegate(mut self, parent: &Contract) -> Self {
        self.delegate = true;
        self.caller = parent.caller;
        self.value = parent.value;
        self
    }

    /// Attach code loaded from `code_address`.
    pub fn set_call_code(&mut self, code_address: Address, code_hash: Hash, code: Vec<u8>) {
        self.code_address = Some(code_address);
        self.code_hash = code_hash;
        self.code = code;
    }

    /// Address the code was loaded from.
    pub fn code_address(&self) -> Address {
        self.code_address.unwrap_or(self.address)
    }

    /// Deduct `gas`. Returns false and leaves the frame untouched when
    /// not enough is left.
    pub fn use_gas(&mut self, gas: u64) -> bool {
        if self.gas < gas {
            return false;
        }
        self.gas -= gas;
        true
    }
}
