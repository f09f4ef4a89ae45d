use super::*;
use axum::{extract::State, routing::post, Json, Router};
use shared::protocol::RpcErrorObject;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct NodeState {
    seen: Arc<Mutex<Vec<RpcRequest>>>,
}

async fn handle_rpc(State(state): State<NodeState>, Json(request): Json<RpcRequest>) -> Json<RpcResponse> {
    state.seen.lock().await.push(request.clone());
    let id = json!(request.id);
    let response = match request.method.as_str() {
        method::CHAIN_ID => RpcResponse::success(id, json!("0x7a69")),
        method::ACCOUNTS => RpcResponse::success(
            id,
            json!(["0xaaa0000000000000000000000000000000000001"]),
        ),
        method::REQUEST_ACCOUNTS => RpcResponse::failure(
            id,
            RpcErrorObject {
                code: USER_REJECTED_REQUEST,
                message: "User rejected the request.".to_string(),
                data: None,
            },
        ),
        method::GET_TRANSACTION_RECEIPT => RpcResponse::success(id, Value::Null),
        other => RpcResponse::failure(
            id,
            RpcErrorObject {
                code: -32601,
                message: format!("method {other} not found"),
                data: None,
            },
        ),
    };
    Json(response)
}

async fn spawn_rpc_node() -> (Url, NodeState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = NodeState::default();
    let app = Router::new()
        .route("/", post(handle_rpc))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let url = Url::parse(&format!("http://{addr}/")).expect("url");
    (url, state)
}

#[tokio::test]
async fn http_provider_returns_result_payload() {
    let (url, node) = spawn_rpc_node().await;
    let provider = HttpWalletProvider::new(url);

    let accounts = request_accounts(&provider, method::ACCOUNTS)
        .await
        .expect("accounts");

    assert_eq!(
        accounts,
        vec![AccountAddress::new("0xaaa0000000000000000000000000000000000001")]
    );
    let seen = node.seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, method::ACCOUNTS);
    assert_eq!(seen[0].jsonrpc, "2.0");
}

#[tokio::test]
async fn http_provider_uses_increasing_request_ids() {
    let (url, node) = spawn_rpc_node().await;
    let provider = HttpWalletProvider::new(url);

    provider.request(method::CHAIN_ID, json!([])).await.expect("first");
    provider.request(method::CHAIN_ID, json!([])).await.expect("second");

    let ids: Vec<u64> = node.seen.lock().await.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn http_provider_surfaces_rpc_error_codes() {
    let (url, _node) = spawn_rpc_node().await;
    let provider = HttpWalletProvider::new(url);

    let err = request_accounts(&provider, method::REQUEST_ACCOUNTS)
        .await
        .expect_err("rejected");

    assert!(err.is_user_rejection());
    assert!(!err.is_transient());
}

#[tokio::test]
async fn null_result_decodes_as_no_accounts() {
    struct NullWallet;

    #[async_trait]
    impl WalletProvider for NullWallet {
        async fn request(&self, _method: &str, _params: Value) -> Result<Value, ProviderError> {
            Ok(Value::Null)
        }
    }

    let accounts = request_accounts(&NullWallet, method::ACCOUNTS)
        .await
        .expect("accounts");
    assert!(accounts.is_empty());
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let provider =
        HttpWalletProvider::new(Url::parse(&format!("http://{addr}/")).expect("url"));

    let err = provider
        .request(method::CHAIN_ID, json!([]))
        .await
        .expect_err("nothing listening");

    assert!(err.is_transient());
}

#[tokio::test]
async fn discovery_without_endpoint_finds_nothing() {
    assert!(HttpWalletDiscovery::new(None).discover().await.is_none());
    assert!(MissingWalletDiscovery.discover().await.is_none());
}

#[tokio::test]
async fn discovery_probes_chain_id() {
    let (url, node) = spawn_rpc_node().await;

    let provider = HttpWalletDiscovery::new(Some(url)).discover().await;

    assert!(provider.is_some());
    let seen = node.seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, method::CHAIN_ID);
}

#[tokio::test]
async fn discovery_treats_failed_probe_as_missing_wallet() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let provider = HttpWalletDiscovery::new(Some(
        Url::parse(&format!("http://{addr}/")).expect("url"),
    ))
    .discover()
    .await;

    assert!(provider.is_none());
}
