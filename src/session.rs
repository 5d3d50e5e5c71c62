//! Engine-facing storage session.
//!
//! A [`Session`] is what an index engine holds while it works against a
//! backend. It brackets the backend's lifetime (`create` on open, `destroy`
//! on close, each exactly once) and routes page requests either through a
//! [`PageBuffer`] or straight to the backend, depending on [`SessionConfig`].

use crate::config::SessionConfig;
use crate::storage::backend::StorageBackend;
use crate::storage::buffer::{BufferStats, PageBuffer};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageRef};
use bytes::Bytes;

/// A page request as issued by an index engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRequest {
    Load(PageId),
    Store { page: PageRef, data: Bytes },
    Delete(PageId),
    Flush,
}

/// Successful outcome of an [`EngineRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineResponse {
    Loaded(Bytes),
    Stored(PageId),
    Deleted,
    Flushed,
}

enum Route<B: StorageBackend> {
    Buffered(PageBuffer<B>),
    Direct(B),
}

impl<B: StorageBackend> Route<B> {
    fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        match self {
            Route::Buffered(buffer) => buffer.load(page_id),
            Route::Direct(backend) => backend.load(page_id),
        }
    }

    fn store(&mut self, page: PageRef, data: Bytes) -> StorageResult<PageId> {
        match self {
            Route::Buffered(buffer) => buffer.store(page, data),
            Route::Direct(backend) => backend.store(page, &data),
        }
    }

    fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        match self {
            Route::Buffered(buffer) => buffer.delete(page_id),
            Route::Direct(backend) => backend.delete(page_id),
        }
    }

    fn flush(&mut self) -> StorageResult<()> {
        match self {
            Route::Buffered(buffer) => buffer.flush(),
            Route::Direct(_) => Ok(()),
        }
    }

    fn backend(&self) -> &B {
        match self {
            Route::Buffered(buffer) => buffer.backend(),
            Route::Direct(backend) => backend,
        }
    }

    fn into_backend(self) -> B {
        match self {
            Route::Buffered(buffer) => buffer.into_inner(),
            Route::Direct(backend) => backend,
        }
    }
}

pub struct Session<B: StorageBackend> {
    /// Only `None` once the session has been closed.
    route: Option<Route<B>>,
    config: SessionConfig,
    /// Set by the first fatal backend error; later requests are refused.
    failure: Option<String>,
}

impl<B: StorageBackend> Session<B> {
    /// Open a session, calling the backend's `create` hook.
    ///
    /// Any `create` failure is reported as [`StorageError::BackendUnavailable`].
    pub fn open(mut backend: B, config: SessionConfig) -> StorageResult<Self> {
        backend.create().map_err(|e| match e {
            StorageError::BackendUnavailable(_) => e,
            other => StorageError::unavailable(format!("failed to create backend: {}", other)),
        })?;

        if config.overwrite {
            if let Err(e) = backend.clear() {
                if let Err(destroy_err) = backend.destroy() {
                    log::error!("Failed to destroy backend after open failure: {}", destroy_err);
                }
                return Err(e);
            }
        }

        log::info!(
            "Opened storage session over {} pages (buffering: {}, writethrough: {}, capacity: {})",
            backend.page_count(),
            config.buffering,
            config.writethrough,
            config.buffering_capacity
        );

        let route = if config.buffering {
            Route::Buffered(PageBuffer::new(
                backend,
                config.buffering_capacity,
                config.writethrough,
            ))
        } else {
            Route::Direct(backend)
        };

        Ok(Self {
            route: Some(route),
            config,
            failure: None,
        })
    }

    pub fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        let result = self.route()?.load(page_id);
        self.observe(result)
    }

    /// Store `data`, returning the id it now lives under.
    pub fn store(
        &mut self,
        page: impl Into<PageRef>,
        data: impl Into<Bytes>,
    ) -> StorageResult<PageId> {
        let result = self.route()?.store(page.into(), data.into());
        self.observe(result)
    }

    pub fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        let result = self.route()?.delete(page_id);
        self.observe(result)
    }

    /// Force buffered writes to the backend.
    pub fn flush(&mut self) -> StorageResult<()> {
        let result = self.route()?.flush();
        self.observe(result)
    }

    pub fn dispatch(&mut self, request: EngineRequest) -> StorageResult<EngineResponse> {
        match request {
            EngineRequest::Load(page_id) => self.load(page_id).map(EngineResponse::Loaded),
            EngineRequest::Store { page, data } => {
                self.store(page, data).map(EngineResponse::Stored)
            }
            EngineRequest::Delete(page_id) => {
                self.delete(page_id).map(|_| EngineResponse::Deleted)
            }
            EngineRequest::Flush => self.flush().map(|_| EngineResponse::Flushed),
        }
    }

    /// End the session: flush, run the backend's `destroy` hook and hand the
    /// backend back so it can be reopened.
    ///
    /// `destroy` runs even if the flush fails; the flush error is returned and
    /// the backend is dropped with it. Open the session over a
    /// [`SharedBackend`](crate::storage::SharedBackend) to keep a handle that
    /// can be reopened after a failed close.
    pub fn close(mut self) -> StorageResult<B> {
        let mut route = self
            .route
            .take()
            .ok_or_else(|| StorageError::unavailable("session is closed"))?;
        let failure = self.failure.take();

        let flushed = if failure.is_none() && self.config.defers_writes() {
            route.flush()
        } else {
            Ok(())
        };
        let mut backend = route.into_backend();
        let page_count = backend.page_count();
        let destroyed = backend.destroy();
        log::info!("Closed storage session over {} pages", page_count);

        flushed?;
        destroyed?;
        if let Some(reason) = failure {
            return Err(StorageError::unavailable(format!("session failed: {}", reason)));
        }
        Ok(backend)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Buffer statistics, or `None` when requests go straight to the backend.
    pub fn stats(&self) -> Option<BufferStats> {
        match self.route.as_ref()? {
            Route::Buffered(buffer) => Some(buffer.stats()),
            Route::Direct(_) => None,
        }
    }

    /// Number of buffered pages whose backend copy is stale.
    pub fn dirty_count(&self) -> usize {
        match &self.route {
            Some(Route::Buffered(buffer)) => buffer.dirty_count(),
            _ => 0,
        }
    }

    pub fn backend(&self) -> Option<&B> {
        self.route.as_ref().map(Route::backend)
    }

    fn route(&mut self) -> StorageResult<&mut Route<B>> {
        if let Some(reason) = &self.failure {
            return Err(StorageError::unavailable(format!(
                "session failed earlier: {}",
                reason
            )));
        }
        self.route
            .as_mut()
            .ok_or_else(|| StorageError::unavailable("session is closed"))
    }

    fn observe<T>(&mut self, result: StorageResult<T>) -> StorageResult<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.failure.is_none() {
                log::error!("Storage session failed: {}", e);
                self.failure = Some(e.to_string());
            }
        }
        result
    }
}

impl<B: StorageBackend> Drop for Session<B> {
    fn drop(&mut self) {
        // Best effort flush on drop
        if let Some(mut route) = self.route.take() {
            log::warn!("Storage session dropped without close");
            if self.failure.is_none() && self.config.defers_writes() {
                if let Err(e) = route.flush() {
                    log::error!("Failed to flush dropped session: {}", e);
                }
            }
            if let Err(e) = route.into_backend().destroy() {
                log::error!("Failed to destroy backend of dropped session: {}", e);
            }
        }
    }
}
