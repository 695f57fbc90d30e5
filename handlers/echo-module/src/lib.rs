//! Echo module
//!
//! Build with `cargo build -p echo-module --release` and point
//! `EDGE_DISPATCH_MODULE_PATH` at the produced shared library.

use edge_dispatch_sdk::prelude::*;

#[derive(Serialize)]
struct Echo<'a> {
    method: &'a str,
    path: &'a str,
    query: &'a std::collections::HashMap<String, String>,
    body: Option<&'a str>,
    request_id: &'a str,
}

async fn echo(req: Request) -> HandlerResult {
    if req.is_method("DELETE") {
        return Err(HandlerError::BadRequest("echo does not delete".to_string()));
    }

    Ok(Response::ok(Echo {
        method: &req.method,
        path: &req.path,
        query: &req.query,
        body: req.body.as_deref(),
        request_id: &req.request_id,
    }))
}

export_module!(echo);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_point_echoes() {
        assert_eq!(EDGE_MODULE_ABI_VERSION, edge_dispatch_sdk::MODULE_ABI_VERSION);

        let handler = edge_module_entry();
        let response = handler
            .call(Request::new("PUT", "/a/b").with_body("payload"))
            .await
            .unwrap();

        let json: JsonValue = serde_json::from_str(response.body.as_deref().unwrap()).unwrap();
        assert_eq!(json["method"], "PUT");
        assert_eq!(json["path"], "/a/b");
        assert_eq!(json["body"], "payload");
    }

    #[tokio::test]
    async fn test_delete_is_rejected() {
        let err = edge_module_entry()
            .call(Request::new("DELETE", "/a"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
