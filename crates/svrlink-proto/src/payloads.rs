//! Control-frame JSON payloads
//!
//! Field names follow the wire format the gateways already speak, so the
//! serde renames are load-bearing.

use serde::{Deserialize, Serialize};

/// Registration handshake, sent as the first frame after a successful dial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInfo {
    #[serde(rename = "id")]
    pub server_id: i32,
    #[serde(rename = "type")]
    pub server_type: i32,
    #[serde(rename = "name")]
    pub server_name: String,
}

/// Server-to-server envelope, relayed by the gateway to the target backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerToServerMsg {
    #[serde(rename = "targetserverid")]
    pub target_server_id: i32,
    #[serde(rename = "targetservertype")]
    pub target_server_type: i32,
    #[serde(rename = "serverid")]
    pub server_id: i32,
    #[serde(rename = "servertype")]
    pub server_type: i32,
    #[serde(rename = "msgid")]
    pub msg_id: u32,
    #[serde(rename = "data")]
    pub data: String,
}

/// Server-to-client envelope, delivered by the gateway to one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerToClientMsg {
    #[serde(rename = "UserID")]
    pub user_id: i32,
    #[serde(rename = "MsgID")]
    pub msg_id: u32,
    #[serde(rename = "Data")]
    pub data: String,
}

/// Stop notification; `is_ret == 1` asks the gateway to acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopNotify {
    #[serde(rename = "isRet")]
    pub is_ret: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_info_wire_names() {
        let info = RegisterInfo {
            server_id: 5,
            server_type: 2,
            server_name: "x".to_string(),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"id":5,"type":2,"name":"x"}"#);
    }

    #[test]
    fn test_server_to_server_round_trip() {
        let msg = ServerToServerMsg {
            target_server_id: 7,
            target_server_type: 3,
            server_id: 5,
            server_type: 2,
            msg_id: 50001,
            data: "{}".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""targetserverid":7"#));
        assert_eq!(serde_json::from_str::<ServerToServerMsg>(&json).unwrap(), msg);
    }

    #[test]
    fn test_stop_notify_wire_names() {
        let json = serde_json::to_string(&StopNotify { is_ret: 1 }).unwrap();
        assert_eq!(json, r#"{"isRet":1}"#);
    }
}
