use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::Result;

pub(super) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased async handler.
///
/// Takes the decoded call arguments and returns the reply value, so handlers
/// of different request/response types can share one registry.
pub(super) trait HandlerFn: Send + Sync {
    fn call(&self, args: Value) -> BoxFuture<'static, Result<Value>>;
}

pub(super) type BoxedHandler = Arc<dyn HandlerFn>;

struct Handler<F, Fut, TReq, TResp> {
    func: F,
    _phantom: PhantomData<fn(TReq) -> (TResp, Fut)>,
}

impl<F, Fut, TReq, TResp> HandlerFn for Handler<F, Fut, TReq, TResp>
where
    F: Fn(TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, args: Value) -> BoxFuture<'static, Result<Value>> {
        // ---
        let req: TReq = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        let fut = (self.func)(req);

        Box::pin(async move {
            let resp = fut.await?;
            Ok(serde_json::to_value(resp)?)
        })
    }
}

/// Wrap a typed handler function into a type-erased handler.
pub(super) fn wrap_handler<F, Fut, TReq, TResp>(func: F) -> BoxedHandler
where
    F: Fn(TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    // ---
    Arc::new(Handler {
        func,
        _phantom: PhantomData,
    })
}
