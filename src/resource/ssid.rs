//! Enterprise wireless SSIDs
//!
//! SSIDs are named by their network name and carry no separate id; the
//! update and delete endpoints address them by name. The passphrase is
//! never returned by the controller, so it is sent but never compared.

use declarative::{Endpoint, FieldSpec, ReadOp, ResourceDescriptor, Result, Schema};

pub const KIND: &str = "ssid";

const PATH: &str = "/dna/intent/api/v1/enterprise-ssid";

pub fn descriptor() -> Result<ResourceDescriptor> {
    let schema = Schema::new()
        .field(FieldSpec::str("name").required().length(1, 32))
        .field(FieldSpec::str("security_level").default("WPA2_ENTERPRISE").choices([
            "WPA2_ENTERPRISE",
            "WPA2_PERSONAL",
            "WPA3_ENTERPRISE",
            "WPA3_PERSONAL",
            "OPEN",
        ]))
        .field(FieldSpec::str("passphrase").sensitive().length(8, 63))
        .field(
            FieldSpec::str("traffic_type")
                .default("voicedata")
                .choices(["voicedata", "data"]),
        )
        .field(FieldSpec::str("radio_policy").choices([
            "Dual band operation (2.4GHz and 5GHz)",
            "Dual band operation with band select",
            "5GHz only",
            "2.4GHz only",
            "Triple band operation (2.4GHz, 5GHz and 6GHz)",
        ]))
        .field(
            FieldSpec::str("fast_transition")
                .default("Adaptive")
                .choices(["Adaptive", "Enable", "Disable"]),
        )
        .field(FieldSpec::bool("enable_broadcast_ssid").default(true))
        .field(FieldSpec::bool("enable_fast_lane"))
        .field(FieldSpec::int("session_timeout").range(1.0, 86400.0))
        .field(FieldSpec::str("site").describe("Hierarchy name of the site the SSID serves"));

    ResourceDescriptor::builder(KIND, schema)
        .description("Enterprise wireless SSID")
        .identity(&["name"])
        .comparable(&[
            "name",
            "security_level",
            "passphrase",
            "traffic_type",
            "radio_policy",
            "fast_transition",
            "enable_broadcast_ssid",
            "enable_fast_lane",
            "session_timeout",
            "site",
        ])
        .write_only(&["passphrase"])
        .depends_on("site", super::site::KIND, "name")
        .api_name("security_level", "securityLevel")
        .api_name("traffic_type", "trafficType")
        .api_name("radio_policy", "radioPolicy")
        .api_name("fast_transition", "fastTransition")
        .api_name("enable_broadcast_ssid", "enableBroadcastSSID")
        .api_name("enable_fast_lane", "enableFastLane")
        .api_name("session_timeout", "sessionTimeOut")
        .api_name("site", "siteNameHierarchy")
        .scope(&["site"])
        .list(
            ReadOp::new(PATH)
                .query("ssidName", "{name}")
                .pointer("/0/ssidDetails"),
        )
        .create(Endpoint::post(PATH))
        .update(Endpoint::put(PATH))
        .delete(Endpoint::delete(format!("{PATH}/{{name}}")))
        .promote_missing_to_create()
        .build()
}
