//! Device discovery jobs

use declarative::{Endpoint, FieldSpec, FieldType, ReadOp, ResourceDescriptor, Result, Schema};
use regex::Regex;

pub const KIND: &str = "discovery";

const PATH: &str = "/dna/intent/api/v1/discovery";

/// A finished discovery-create task reports the new discovery's id as its
/// progress, sometimes before `endTime` is set.
const CREATED: &str = r"^\d+$";

pub fn descriptor() -> Result<ResourceDescriptor> {
    let schema = Schema::new()
        .field(FieldSpec::str("id"))
        .field(FieldSpec::str("name").required().length(1, 64))
        .field(
            FieldSpec::str("discovery_type")
                .required()
                .choices(["Single", "Range", "Multi Range", "CDP", "LLDP", "CIDR"]),
        )
        .field(
            FieldSpec::str("ip_address_list")
                .required()
                .describe("Seed address, range (a-b) or CIDR, depending on the type"),
        )
        .field(
            FieldSpec::str("protocol_order")
                .default("ssh,telnet")
                .choices(["ssh", "telnet", "ssh,telnet", "telnet,ssh"]),
        )
        .field(FieldSpec::int("retry").range(0.0, 5.0))
        .field(FieldSpec::int("timeout").range(1.0, 300.0))
        .field(FieldSpec::int("cdp_level").range(1.0, 16.0))
        .field(FieldSpec::list("global_credential_id_list", FieldType::Str).length(1, 16))
        .field(
            FieldSpec::str("preferred_mgmt_ip_method")
                .default("None")
                .choices(["None", "UseLoopBack"]),
        );

    let created = Regex::new(CREATED).map_err(|e| declarative::Error::Descriptor {
        kind: KIND.to_string(),
        message: e.to_string(),
    })?;

    ResourceDescriptor::builder(KIND, schema)
        .description("Device discovery job")
        .identity(&["name"])
        .id_field("id")
        .comparable(&[
            "name",
            "discovery_type",
            "ip_address_list",
            "protocol_order",
            "retry",
            "timeout",
            "cdp_level",
            "global_credential_id_list",
            "preferred_mgmt_ip_method",
        ])
        .api_name("discovery_type", "discoveryType")
        .api_name("ip_address_list", "ipAddressList")
        .api_name("protocol_order", "protocolOrder")
        .api_name("cdp_level", "cdpLevel")
        .api_name("global_credential_id_list", "globalCredentialIdList")
        .api_name("preferred_mgmt_ip_method", "preferredMgmtIPMethod")
        .list(ReadOp::new(format!("{PATH}/1/500")))
        .read(ReadOp::new(format!("{PATH}/{{id}}")))
        .create(Endpoint::post(PATH).success_pattern(created))
        .update(Endpoint::put(PATH))
        .delete(Endpoint::delete(format!("{PATH}/{{id}}")))
        .build()
}
