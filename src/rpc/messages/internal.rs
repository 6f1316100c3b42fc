use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessage {
    #[serde(rename = "s", with = "serde_bytes")]
    pub sender: [u8; 26],

    #[serde(rename = "n", with = "serde_bytes")]
    pub nonce: [u8; 20],

    #[serde(flatten)]
    pub variant: WireVariant,
}

impl WireMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<WireMessage, serde_bencode::Error> {
        serde_bencode::from_bytes(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "y")]
pub enum WireVariant {
    #[serde(rename = "q")]
    Request(WireRequestSpecific),

    #[serde(rename = "r")]
    Response(WireResponseSpecific),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum WireRequestSpecific {
    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "store")]
    Store {
        #[serde(rename = "a")]
        arguments: WireStoreRequestArguments,
    },

    #[serde(rename = "find_node")]
    FindNode {
        #[serde(rename = "a")]
        arguments: WireTargetArguments,
    },

    #[serde(rename = "find_value")]
    FindValue {
        #[serde(rename = "a")]
        arguments: WireTargetArguments,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum WireResponseSpecific {
    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "store")]
    Store,

    #[serde(rename = "find_node")]
    FindNode {
        #[serde(rename = "a")]
        arguments: WireContactsArguments,
    },

    #[serde(rename = "find_value")]
    FindValue {
        #[serde(rename = "a")]
        arguments: WireFindValueArguments,
    },
}

// === Arguments ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireStoreRequestArguments {
    #[serde(rename = "d", with = "serde_bytes")]
    pub data: Box<[u8]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireTargetArguments {
    #[serde(rename = "t", with = "serde_bytes")]
    pub target: [u8; 20],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireContactsArguments {
    #[serde(rename = "c", with = "serde_bytes")]
    pub contacts: Box<[u8]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireFindValueArguments {
    #[serde(rename = "c", with = "serde_bytes")]
    pub contacts: Box<[u8]>,

    #[serde(rename = "d", with = "serde_bytes")]
    #[serde(default)]
    pub data: Option<Box<[u8]>>,
}
