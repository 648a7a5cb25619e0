use async_trait::async_trait;
use std::sync::Mutex;

/// Purpose of an outbound link message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Welcome,
    MagicLink,
    PasswordRecovery,
}

impl NotificationKind {
    /// Path of the page the link lands on.
    pub fn path(&self) -> &'static str {
        match self {
            NotificationKind::Welcome => "/set_password",
            NotificationKind::MagicLink => "/magic_link",
            NotificationKind::PasswordRecovery => "/password_reset",
        }
    }
}

/// A bearer token to embed in an out-of-band link. Rendering and delivery
/// belong to the sender.
#[derive(Clone)]
pub struct LinkNotification {
    pub recipient: String,
    pub kind: NotificationKind,
    pub token: String,
}

impl LinkNotification {
    /// Query parameters for the link URL.
    pub fn url_params(&self) -> Vec<(&'static str, String)> {
        match self.kind {
            NotificationKind::MagicLink => vec![("code", self.token.clone())],
            NotificationKind::Welcome | NotificationKind::PasswordRecovery => vec![
                ("token", self.token.clone()),
                ("email", self.recipient.clone()),
            ],
        }
    }
}

impl std::fmt::Debug for LinkNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkNotification")
            .field("recipient", &self.recipient)
            .field("kind", &self.kind)
            .field("token", &"***")
            .finish()
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_link(&self, notification: &LinkNotification) -> Result<(), anyhow::Error>;
}

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct MockNotificationSender {
    pub sent: Mutex<Vec<LinkNotification>>,
    pub fail: bool,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<LinkNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_token(&self, kind: NotificationKind) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|n| n.kind == kind)
            .map(|n| n.token)
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_link(&self, notification: &LinkNotification) -> Result<(), anyhow::Error> {
        if self.fail {
            return Err(anyhow::anyhow!("delivery unavailable"));
        }
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("Mutex poisoned: {}", e))?
            .push(notification.clone());
        Ok(())
    }
}
