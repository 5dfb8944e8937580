//! Controller user accounts
//!
//! The user API answers synchronously; none of its endpoints return a task.
//! Usernames are matched without regard to case.

use declarative::{Endpoint, FieldSpec, FieldType, ReadOp, ResourceDescriptor, Result, Schema};

pub const KIND: &str = "user";

const PATH: &str = "/dna/system/api/v1/user";

pub fn descriptor() -> Result<ResourceDescriptor> {
    let schema = Schema::new()
        .field(FieldSpec::str("user_id"))
        .field(FieldSpec::str("username").required().length(1, 64))
        .field(FieldSpec::str("first_name"))
        .field(FieldSpec::str("last_name"))
        .field(FieldSpec::str("email"))
        .field(FieldSpec::str("password").sensitive().length(8, 255))
        .field(
            FieldSpec::list("role_list", FieldType::Str)
                .length(1, 8)
                .describe("Role ids"),
        );

    ResourceDescriptor::builder(KIND, schema)
        .description("Controller user account")
        .identity(&["username"])
        .id_field("user_id")
        .case_insensitive(&["username"])
        .write_only(&["password"])
        .api_name("user_id", "userId")
        .api_name("first_name", "firstName")
        .api_name("last_name", "lastName")
        .api_name("role_list", "roleList")
        .list(ReadOp::new(PATH).pointer("/response/users"))
        .create(Endpoint::post(PATH).inline())
        .update(Endpoint::put(PATH).inline())
        .delete(Endpoint::delete(format!("{PATH}/{{user_id}}")).inline())
        .build()
}
