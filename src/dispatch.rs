//! Dedicated engine thread.
//!
//! The engine and every entity handle transition are confined to one thread.
//! Host code on other threads (or async tasks) marshals closures onto it:
//!
//! ```ignore
//! let thread = EngineThread::spawn(BridgeConfig::from_env(), |config| {
//!     Ok(Bridge::with_config(Heap::with_config(config), registry, config.clone()))
//! })?;
//!
//! let entity = thread.run(|bridge| bridge.create_entity(&"app.Point".into())).await??;
//! let json = thread
//!     .run(move |bridge| bridge.proxy(&entity).to_json_string())
//!     .await??;
//! ```
//!
//! Jobs queue on a bounded channel; senders wait once
//! `dispatch_queue_size` jobs are pending.

use std::sync::mpsc as std_mpsc;
use std::thread;

use tokio::sync::{mpsc, oneshot};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::engine::ScriptEngine;
use crate::error::{BridgeError, BridgeResult};

type Job<E> = Box<dyn FnOnce(&mut Bridge<E>) + Send>;

pub struct EngineThread<E: ScriptEngine + 'static> {
    sender: Option<mpsc::Sender<Job<E>>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl<E: ScriptEngine + 'static> EngineThread<E> {
    /// Start the thread and build the bridge on it.
    ///
    /// Engines are not `Send`, so `factory` runs on the new thread. Its error,
    /// if any, is returned here.
    pub fn spawn<F>(config: BridgeConfig, factory: F) -> BridgeResult<Self>
    where
        F: FnOnce(&BridgeConfig) -> BridgeResult<Bridge<E>> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<Job<E>>(config.dispatch_queue_size.max(1));
        let (ready_tx, ready_rx) = std_mpsc::channel::<BridgeResult<()>>();

        let thread_handle = thread::Builder::new()
            .name("object-bridge-engine".into())
            .spawn(move || {
                let mut bridge = match factory(&config) {
                    Ok(bridge) => {
                        let _ = ready_tx.send(Ok(()));
                        bridge
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                log::debug!("Engine thread started");

                while let Some(job) = receiver.blocking_recv() {
                    job(&mut bridge);
                }

                log::debug!("Engine thread stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                sender: Some(sender),
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            // Factory panicked
            Err(_) => {
                let _ = thread_handle.join();
                Err(BridgeError::EngineThreadStopped)
            }
        }
    }

    fn job<F, R>(f: F) -> (Job<E>, oneshot::Receiver<R>)
    where
        F: FnOnce(&mut Bridge<E>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job<E> = Box::new(move |bridge| {
            // Receiver gone means the caller stopped waiting
            let _ = tx.send(f(bridge));
        });
        (job, rx)
    }

    /// Run `f` on the engine thread and await its result.
    pub async fn run<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&mut Bridge<E>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(BridgeError::EngineThreadStopped)?;
        let (job, rx) = Self::job(f);

        sender
            .send(job)
            .await
            .map_err(|_| BridgeError::EngineThreadStopped)?;
        rx.await.map_err(|_| BridgeError::EngineThreadStopped)
    }

    /// Blocking form of [`run`](Self::run) for synchronous host threads.
    ///
    /// # Panics
    ///
    /// When called from within an async runtime.
    pub fn run_blocking<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&mut Bridge<E>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(BridgeError::EngineThreadStopped)?;
        let (job, rx) = Self::job(f);

        sender
            .blocking_send(job)
            .map_err(|_| BridgeError::EngineThreadStopped)?;
        rx.blocking_recv().map_err(|_| BridgeError::EngineThreadStopped)
    }

    /// Whether the thread still accepts jobs.
    pub fn is_running(&self) -> bool {
        self.sender.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    /// Let queued jobs finish, then stop the thread and drop the bridge.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the channel ends the receive loop once the queue drains
        self.sender.take();

        if let Some(handle) = self.thread_handle.take()
            && let Err(e) = handle.join()
        {
            log::warn!("Engine thread panicked: {:?}", e);
        }
    }
}

impl<E: ScriptEngine + 'static> Drop for EngineThread<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::Heap;
    use crate::registry::StaticRegistry;

    fn spawn() -> EngineThread<Heap> {
        EngineThread::spawn(BridgeConfig::default(), |config| {
            let registry = StaticRegistry::<Heap>::builder().build()?;
            Ok(Bridge::with_config(
                Heap::with_config(config),
                Arc::new(registry),
                config.clone(),
            ))
        })
        .unwrap()
    }

    #[test]
    fn test_run_blocking() {
        let thread = spawn();
        let live = thread.run_blocking(|bridge| bridge.engine().live_objects()).unwrap();
        assert!(live > 0);
        assert!(thread.is_running());
    }

    #[test]
    fn test_factory_error_is_returned() {
        let result = EngineThread::<Heap>::spawn(BridgeConfig::default(), |_| {
            Err(BridgeError::UnknownClass("app.Missing".into()))
        });
        assert!(matches!(result, Err(BridgeError::UnknownClass(_))));
    }

    #[test]
    fn test_panicking_job_stops_thread() {
        let thread = spawn();
        let result = thread.run_blocking(|_| -> () { panic!("job failed") });
        assert!(matches!(result, Err(BridgeError::EngineThreadStopped)));

        let result = thread.run_blocking(|_| ());
        assert!(matches!(result, Err(BridgeError::EngineThreadStopped)));
    }
}
