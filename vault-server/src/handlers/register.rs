//! Register handler

use tracing::{info, warn};
use uuid::Uuid;
use vault_common::ClientId;
use vault_common::validators::validate_client_name;
use vault_common::wire::{RegisterRequest, Response};

use super::{HandlerContext, Reply};
use crate::error::CoreError;

/// Handle a Register request
///
/// Registration is idempotent for the identifier in the request header: a
/// client re-registering its own name gets its existing id back. A name owned
/// by any other id, in memory or in the store, is refused. Otherwise a new
/// random id is issued and persisted.
///
/// # Errors
///
/// `ClientConflict` (sent as RegisterFailed) when the name is taken; storage
/// errors if the new client cannot be persisted.
pub fn handle_register(
    ctx: &HandlerContext<'_>,
    header_id: ClientId,
    payload: &[u8],
) -> Result<Reply, CoreError> {
    let request = RegisterRequest::decode(payload)?;
    let name = request.name;

    if let Err(e) = validate_client_name(&name) {
        warn!(client = name.as_str(), error = %e, "registration refused: invalid name");
        return Ok(Reply::anonymous(Response::register_failed()));
    }

    if let Some(record) = ctx.store.load_client_by_name(&name)? {
        if record.id != header_id {
            return Err(CoreError::ClientConflict(format!(
                "name '{name}' is already registered"
            )));
        }
        let client = ctx
            .registry
            .register(record.id, &record.name, record.public_key)?;
        return Ok(Reply::send(&client, Response::register_success(&client.id())));
    }

    if let Some(existing) = ctx.registry.lookup_by_name(&name) {
        if existing.id() != header_id {
            return Err(CoreError::ClientConflict(format!(
                "name '{name}' is already registered"
            )));
        }
        return Ok(Reply::send(
            &existing,
            Response::register_success(&existing.id()),
        ));
    }

    let id = ClientId::from_bytes(*Uuid::new_v4().as_bytes());
    let client = ctx.registry.register(id, &name, None)?;
    if let Err(e) = ctx.save_client(&client) {
        ctx.registry.remove(&id);
        return Err(e);
    }

    info!(client = name.as_str(), id = %id, "client registered");
    Ok(Reply::send(&client, Response::register_success(&id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::TestContext;
    use vault_common::ResponseCode;

    fn payload(name: &str) -> Vec<u8> {
        RegisterRequest {
            name: name.to_string(),
        }
        .encode()
        .unwrap()
    }

    fn issued_id(reply: &Reply) -> ClientId {
        let response = reply.response.as_ref().unwrap();
        assert_eq!(response.code, ResponseCode::RegisterSuccess);
        ClientId::from_slice(&response.payload).unwrap()
    }

    #[test]
    fn test_register_new_client() {
        let test = TestContext::new();
        let ctx = test.context();
        let reply = handle_register(&ctx, ClientId::default(), &payload("bob")).unwrap();
        let id = issued_id(&reply);

        assert_ne!(id, ClientId::default());
        assert_eq!(ctx.registry.lookup_by_name("bob").unwrap().id(), id);
        assert_eq!(ctx.store.load_client(&id).unwrap().unwrap().name, "bob");
    }

    #[test]
    fn test_register_conflict_and_idempotence() {
        let test = TestContext::new();
        let ctx = test.context();
        let id = issued_id(&handle_register(&ctx, ClientId::default(), &payload("bob")).unwrap());

        // Another client asking for the same name
        let other = ClientId::from_bytes([9; 16]);
        assert!(matches!(
            handle_register(&ctx, other, &payload("bob")),
            Err(CoreError::ClientConflict(_))
        ));

        // The owner re-registering gets the same id back
        let again = handle_register(&ctx, id, &payload("bob")).unwrap();
        assert_eq!(issued_id(&again), id);
        assert_eq!(ctx.registry.len(), 1);
    }

    #[test]
    fn test_persisted_name_is_reserved() {
        let test = TestContext::new();
        let ctx = test.context();
        let id = issued_id(&handle_register(&ctx, ClientId::default(), &payload("bob")).unwrap());
        ctx.registry.remove(&id);

        assert!(matches!(
            handle_register(&ctx, ClientId::from_bytes([3; 16]), &payload("bob")),
            Err(CoreError::ClientConflict(_))
        ));
        let reply = handle_register(&ctx, id, &payload("bob")).unwrap();
        assert_eq!(issued_id(&reply), id);
    }

    #[test]
    fn test_invalid_name_fails_registration() {
        let test = TestContext::new();
        let ctx = test.context();
        for name in ["", "bob smith", &"x".repeat(51)] {
            let reply = handle_register(&ctx, ClientId::default(), &payload(name)).unwrap();
            assert_eq!(
                reply.response.unwrap().code,
                ResponseCode::RegisterFailed
            );
        }
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn test_malformed_payload() {
        let test = TestContext::new();
        let ctx = test.context();
        assert!(matches!(
            handle_register(&ctx, ClientId::default(), b"short"),
            Err(CoreError::Protocol(_))
        ));
    }
}
