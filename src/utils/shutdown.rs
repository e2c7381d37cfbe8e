use tokio::sync::broadcast;

/// Listens for a one-shot shutdown broadcast.
///
/// `recv` resolves when the paired sender fires or drops, and keeps
/// resolving immediately afterwards, so it is safe to poll inside a select
/// loop.
#[derive(Debug)]
pub(crate) struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub(crate) fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    pub(crate) fn subscribe(notify: &broadcast::Sender<()>) -> Shutdown {
        Shutdown::new(notify.subscribe())
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub(crate) async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_resolves_on_signal_and_stays_resolved() {
        let (tx, _) = broadcast::channel(1);
        let mut shutdown = Shutdown::subscribe(&tx);
        assert!(!shutdown.is_shutdown());

        tx.send(()).unwrap();
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
        // second call must not block
        shutdown.recv().await;
    }

    #[tokio::test]
    async fn recv_resolves_when_sender_drops() {
        let (tx, _) = broadcast::channel(1);
        let mut shutdown = Shutdown::subscribe(&tx);
        drop(tx);
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }
}
