//! Request/response interceptors.
//!
//! Interceptors run for application traffic only; protocol-internal
//! messages (the handshake) skip them. Any async closure with the right
//! signature is an interceptor.

use crate::error::InterceptorError;
use crate::transaction::{Request, Response};
use async_trait::async_trait;
use std::future::Future;

/// Transforms a request before it is posted.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: Request) -> Result<Request, InterceptorError>;
}

/// Transforms a matched response before its task is settled.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: Response) -> Result<Response, InterceptorError>;
}

/// Interceptor passing values through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl RequestInterceptor for Identity {
    async fn intercept(&self, request: Request) -> Result<Request, InterceptorError> {
        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for Identity {
    async fn intercept(&self, response: Response) -> Result<Response, InterceptorError> {
        Ok(response)
    }
}

#[async_trait]
impl<F, Fut> RequestInterceptor for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Request, InterceptorError>> + Send + 'static,
{
    async fn intercept(&self, request: Request) -> Result<Request, InterceptorError> {
        (self)(request).await
    }
}

#[async_trait]
impl<F, Fut> ResponseInterceptor for F
where
    F: Fn(Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, InterceptorError>> + Send + 'static,
{
    async fn intercept(&self, response: Response) -> Result<Response, InterceptorError> {
        (self)(response).await
    }
}
