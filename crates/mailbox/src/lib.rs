//! Mailbox store for inter-agent messaging.
//!
//! Every agent owns one ordered inbox keyed by its name. Delivery is either
//! fire-and-forget or BLOCKING; a blocking send registers a pending request
//! that is resolved exactly once, by a reply, a timeout or a cancellation,
//! and then removed.
//!
//! All inboxes and the pending table sit behind a single mutex, so append and
//! dequeue-and-mark-read are each one critical section and per-recipient order
//! is FIFO no matter how many senders interleave.

mod mail;

pub use mail::{DeliveryMode, Mail, MailBody, MailStatus, NewMail, Priority};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use swarmline_core::MailboxError;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A blocking request awaiting its reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    pub message_id: String,
    /// The agent suspended on the reply
    pub waiter: String,
    pub recipient: String,
    pub deadline: DateTime<Utc>,
}

/// How a pending request was settled.
#[derive(Debug)]
enum Resolution {
    Replied(Mail),
    Cancelled,
}

struct PendingSlot {
    request: PendingRequest,
    reply: oneshot::Sender<Resolution>,
}

/// The sender's side of a blocking send.
#[derive(Debug)]
pub struct ReplyHandle {
    request: PendingRequest,
    deadline_at: Instant,
    started: Instant,
    rx: oneshot::Receiver<Resolution>,
}

impl ReplyHandle {
    pub fn message_id(&self) -> &str {
        &self.request.message_id
    }

    pub fn request(&self) -> &PendingRequest {
        &self.request
    }

    /// The instant after which the request times out.
    pub fn deadline(&self) -> Instant {
        self.deadline_at
    }
}

/// Result of [`Mailbox::send`].
#[derive(Debug)]
pub struct Sent {
    pub message_id: String,
    /// Present for BLOCKING sends
    pub reply: Option<ReplyHandle>,
}

#[derive(Default)]
struct Inner {
    agents: HashSet<String>,
    inboxes: HashMap<String, Vec<Mail>>,
    pending: HashMap<String, PendingSlot>,
}

impl Inner {
    fn find(&self, message_id: &str) -> Option<&Mail> {
        self.inboxes
            .values()
            .flat_map(|inbox| inbox.iter())
            .find(|m| m.id == message_id)
    }

    fn find_mut(&mut self, message_id: &str) -> Option<&mut Mail> {
        self.inboxes
            .values_mut()
            .flat_map(|inbox| inbox.iter_mut())
            .find(|m| m.id == message_id)
    }
}

/// The process-wide mailbox store.
pub struct Mailbox {
    inner: Mutex<Inner>,
    default_deadline: Duration,
}

impl Mailbox {
    pub fn new(default_deadline: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            default_deadline,
        }
    }

    /// Create an inbox for `agent`. Registering twice is a no-op.
    pub fn register(&self, agent: impl Into<String>) {
        let agent = agent.into();
        let mut inner = self.inner.lock();
        inner.inboxes.entry(agent.clone()).or_default();
        inner.agents.insert(agent);
    }

    pub fn is_registered(&self, agent: &str) -> bool {
        self.inner.lock().agents.contains(agent)
    }

    /// Deliver a message. BLOCKING sends also register a pending request.
    pub fn send(&self, mail: NewMail, mode: DeliveryMode) -> Result<Sent, MailboxError> {
        if mail.body.content.trim().is_empty() {
            return Err(MailboxError::InvalidMessage("message content is empty".into()));
        }
        if mode == DeliveryMode::Blocking && mail.from == mail.to {
            return Err(MailboxError::SelfSend(mail.from));
        }

        let wait = self.wait_for(&mail.body);
        let mut inner = self.inner.lock();
        if !inner.agents.contains(&mail.to) {
            return Err(MailboxError::UnknownRecipient(mail.to));
        }

        let stamped = Mail::stamp(mail, mode, None);
        let message_id = stamped.id.clone();
        let (from, to) = (stamped.from.clone(), stamped.to.clone());

        let reply = match mode {
            DeliveryMode::FireAndForget => None,
            DeliveryMode::Blocking => {
                let (tx, rx) = oneshot::channel();
                let now = Utc::now();
                let deadline = chrono::Duration::from_std(wait)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                let request = PendingRequest {
                    message_id: message_id.clone(),
                    waiter: from.clone(),
                    recipient: to.clone(),
                    deadline,
                };
                inner.pending.insert(
                    message_id.clone(),
                    PendingSlot {
                        request: request.clone(),
                        reply: tx,
                    },
                );
                let started = Instant::now();
                let deadline_at = started
                    .checked_add(wait)
                    .unwrap_or_else(|| started + self.default_deadline);
                Some(ReplyHandle {
                    request,
                    deadline_at,
                    started,
                    rx,
                })
            }
        };

        inner.inboxes.entry(to.clone()).or_default().push(stamped);
        info!(message_id = %message_id, from = %from, to = %to, mode = ?mode, "Mail delivered");

        Ok(Sent { message_id, reply })
    }

    /// Wait until the request is answered, cancelled, or its deadline passes.
    ///
    /// On timeout the pending request is removed before returning.
    pub async fn await_reply(&self, handle: ReplyHandle) -> Result<Mail, MailboxError> {
        let message_id = handle.request.message_id.clone();
        match tokio::time::timeout_at(handle.deadline_at, handle.rx).await {
            Ok(Ok(Resolution::Replied(mail))) => Ok(mail),
            Ok(Ok(Resolution::Cancelled)) | Ok(Err(_)) => Err(MailboxError::Cancelled { message_id }),
            Err(_) => {
                self.expire(&message_id);
                let waited_ms = handle.started.elapsed().as_millis() as u64;
                warn!(message_id = %message_id, waited_ms, "Blocking mail timed out");
                Err(MailboxError::Timeout {
                    message_id,
                    waited_ms,
                })
            }
        }
    }

    /// Unread messages for `recipient` in delivery order, marked read atomically.
    pub fn check(&self, recipient: &str) -> Result<Vec<Mail>, MailboxError> {
        let mut inner = self.inner.lock();
        let inbox = inner
            .inboxes
            .get_mut(recipient)
            .ok_or_else(|| MailboxError::UnknownRecipient(recipient.to_string()))?;

        let mut unread = Vec::new();
        for mail in inbox.iter_mut().filter(|m| !m.read) {
            mail.read = true;
            if mail.status == MailStatus::Unread {
                mail.status = MailStatus::Read;
            }
            unread.push(mail.clone());
        }
        debug!(agent = %recipient, count = unread.len(), "Checked mailbox");
        Ok(unread)
    }

    /// Answer `original_id`. The reply lands in the original sender's inbox
    /// and settles its pending request, if any. Returns the reply's id.
    pub fn reply(&self, original_id: &str, body: MailBody) -> Result<String, MailboxError> {
        if body.content.trim().is_empty() {
            return Err(MailboxError::InvalidMessage("reply content is empty".into()));
        }

        let mut inner = self.inner.lock();
        let original = inner
            .find_mut(original_id)
            .ok_or_else(|| MailboxError::UnknownMessage(original_id.to_string()))?;
        original.status = MailStatus::Replied;
        original.read = true;

        let subject = if original.subject.starts_with("Re: ") {
            original.subject.clone()
        } else {
            format!("Re: {}", original.subject)
        };
        let new = NewMail::new(original.to.clone(), original.from.clone(), subject, body);
        let mut reply = Mail::stamp(new, DeliveryMode::FireAndForget, Some(original_id.to_string()));
        let reply_id = reply.id.clone();

        if let Some(slot) = inner.pending.remove(original_id) {
            // Handed to the waiter directly; it never shows up as unread.
            reply.read = true;
            reply.status = MailStatus::Read;
            let _ = slot.reply.send(Resolution::Replied(reply.clone()));
            info!(message_id = %original_id, reply_id = %reply_id, "Pending request resolved by reply");
        }

        inner.inboxes.entry(reply.to.clone()).or_default().push(reply);
        Ok(reply_id)
    }

    /// Resolve a pending request as cancelled.
    pub fn cancel(&self, message_id: &str) -> Result<(), MailboxError> {
        let slot = self
            .inner
            .lock()
            .pending
            .remove(message_id)
            .ok_or_else(|| MailboxError::UnknownMessage(message_id.to_string()))?;
        let _ = slot.reply.send(Resolution::Cancelled);
        info!(message_id = %message_id, "Pending request cancelled");
        Ok(())
    }

    /// Cancel every request `waiter` is suspended on. Returns how many.
    pub fn cancel_all(&self, waiter: &str) -> usize {
        let slots: Vec<PendingSlot> = {
            let mut inner = self.inner.lock();
            let ids: Vec<String> = inner
                .pending
                .iter()
                .filter(|(_, slot)| slot.request.waiter == waiter)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| inner.pending.remove(id)).collect()
        };
        let count = slots.len();
        for slot in slots {
            let _ = slot.reply.send(Resolution::Cancelled);
        }
        count
    }

    /// Drop a pending request whose deadline passed.
    fn expire(&self, message_id: &str) {
        self.inner.lock().pending.remove(message_id);
    }

    /// Every message in `agent`'s inbox, including read and archived ones.
    pub fn all_mail(&self, agent: &str) -> Vec<Mail> {
        self.inner
            .lock()
            .inboxes
            .get(agent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn unread_count(&self, agent: &str) -> usize {
        self.inner
            .lock()
            .inboxes
            .get(agent)
            .map(|inbox| inbox.iter().filter(|m| !m.read).count())
            .unwrap_or(0)
    }

    /// Archive a message in `agent`'s inbox.
    pub fn archive(&self, agent: &str, message_id: &str) -> Result<(), MailboxError> {
        let mut inner = self.inner.lock();
        let mail = inner
            .inboxes
            .get_mut(agent)
            .and_then(|inbox| inbox.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| MailboxError::UnknownMessage(message_id.to_string()))?;
        mail.status = MailStatus::Archived;
        mail.read = true;
        Ok(())
    }

    /// The whole conversation `message_id` belongs to, oldest first.
    pub fn thread(&self, message_id: &str) -> Result<Vec<Mail>, MailboxError> {
        let inner = self.inner.lock();
        let mut root = inner
            .find(message_id)
            .ok_or_else(|| MailboxError::UnknownMessage(message_id.to_string()))?;
        while let Some(parent) = root.reply_to.as_deref().and_then(|id| inner.find(id)) {
            root = parent;
        }

        let mut members: HashSet<&str> = HashSet::from([root.id.as_str()]);
        let all: Vec<&Mail> = inner.inboxes.values().flat_map(|inbox| inbox.iter()).collect();
        loop {
            let before = members.len();
            for mail in &all {
                if mail.reply_to.as_deref().is_some_and(|p| members.contains(p)) {
                    members.insert(mail.id.as_str());
                }
            }
            if members.len() == before {
                break;
            }
        }

        let mut thread: Vec<Mail> = all
            .into_iter()
            .filter(|m| members.contains(m.id.as_str()))
            .cloned()
            .collect();
        thread.sort_by_key(|m| m.delivered_at);
        Ok(thread)
    }

    /// Requests `agent` is currently waiting on.
    pub fn pending_for(&self, agent: &str) -> Vec<PendingRequest> {
        self.inner
            .lock()
            .pending
            .values()
            .filter(|slot| slot.request.waiter == agent)
            .map(|slot| slot.request.clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    fn wait_for(&self, body: &MailBody) -> Duration {
        match body.deadline {
            Some(deadline) => (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => self.default_deadline,
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn mailbox() -> Mailbox {
        let mb = Mailbox::new(Duration::from_secs(5));
        mb.register("alice");
        mb.register("bob");
        mb.register("carol");
        mb
    }

    fn note(from: &str, to: &str, content: &str) -> NewMail {
        NewMail::new(from, to, "note", MailBody::new(content))
    }

    #[test]
    fn fire_and_forget_is_queued_unread() {
        let mb = mailbox();
        let sent = mb.send(note("alice", "bob", "hi"), DeliveryMode::FireAndForget).unwrap();
        assert!(sent.reply.is_none());
        assert_eq!(mb.unread_count("bob"), 1);
        assert_eq!(mb.pending_count(), 0);
    }

    #[test]
    fn unknown_recipient_is_rejected() {
        let mb = mailbox();
        let err = mb.send(note("alice", "zed", "hi"), DeliveryMode::FireAndForget).unwrap_err();
        assert_eq!(err, MailboxError::UnknownRecipient("zed".into()));
    }

    #[test]
    fn blocking_self_send_is_rejected() {
        let mb = mailbox();
        let err = mb.send(note("alice", "alice", "hi"), DeliveryMode::Blocking).unwrap_err();
        assert_eq!(err, MailboxError::SelfSend("alice".into()));
    }

    #[tokio::test]
    async fn far_future_deadline_does_not_overflow() {
        let mb = mailbox();
        let body = MailBody::new("whenever").with_deadline(DateTime::<Utc>::MAX_UTC);
        let sent = mb
            .send(NewMail::new("alice", "bob", "later", body), DeliveryMode::Blocking)
            .unwrap();
        let handle = sent.reply.unwrap();
        assert!(handle.deadline() > Instant::now());
        assert_eq!(mb.pending_count(), 1);
    }

    #[test]
    fn check_returns_fifo_and_marks_read() {
        let mb = mailbox();
        mb.send(note("alice", "bob", "1"), DeliveryMode::FireAndForget).unwrap();
        mb.send(note("carol", "bob", "2"), DeliveryMode::FireAndForget).unwrap();
        mb.send(note("alice", "bob", "3"), DeliveryMode::FireAndForget).unwrap();

        let first = mb.check("bob").unwrap();
        let contents: Vec<&str> = first.iter().map(|m| m.body.content.as_str()).collect();
        assert_eq!(contents, vec!["1", "2", "3"]);
        assert!(first.iter().all(|m| m.read && m.status == MailStatus::Read));

        assert!(mb.check("bob").unwrap().is_empty());
        assert_eq!(mb.all_mail("bob").len(), 3);
    }

    #[tokio::test]
    async fn fifo_holds_under_interleaved_senders() {
        let mb = Arc::new(mailbox());
        let mut tasks = Vec::new();
        for sender in ["alice", "carol"] {
            let mb = Arc::clone(&mb);
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    mb.send(note(sender, "bob", &format!("{sender}-{i}")), DeliveryMode::FireAndForget)
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let inbox = mb.check("bob").unwrap();
        assert_eq!(inbox.len(), 100);
        for sender in ["alice", "carol"] {
            let seq: Vec<usize> = inbox
                .iter()
                .filter(|m| m.from == sender)
                .map(|m| m.body.content.rsplit('-').next().unwrap().parse().unwrap())
                .collect();
            assert_eq!(seq, (0..50).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn reply_resolves_pending_request() {
        let mb = mailbox();
        let sent = mb
            .send(NewMail::new("alice", "bob", "math", MailBody::new("What is 2+2?")), DeliveryMode::Blocking)
            .unwrap();
        let handle = sent.reply.unwrap();
        assert_eq!(mb.pending_for("alice").len(), 1);

        let question = mb.check("bob").unwrap().remove(0);
        mb.reply(&question.id, MailBody::new("4")).unwrap();

        let reply = mb.await_reply(handle).await.unwrap();
        assert_eq!(reply.body.content, "4");
        assert_eq!(reply.reply_to.as_deref(), Some(question.id.as_str()));
        assert_eq!(reply.subject, "Re: math");
        assert!(mb.pending_for("alice").is_empty());
        // Delivered to the waiter directly
        assert_eq!(mb.unread_count("alice"), 0);
        assert_eq!(mb.all_mail("bob")[0].status, MailStatus::Replied);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_timeouts_leave_no_pending() {
        let mb = mailbox();
        for i in 0..4 {
            let sent = mb
                .send(note("alice", "bob", &format!("q{i}")), DeliveryMode::Blocking)
                .unwrap();
            let err = mb.await_reply(sent.reply.unwrap()).await.unwrap_err();
            assert!(matches!(err, MailboxError::Timeout { waited_ms, .. } if waited_ms >= 5000));
        }
        assert!(mb.pending_for("alice").is_empty());
        assert_eq!(mb.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_resolves_wait() {
        let mb = mailbox();
        let sent = mb.send(note("alice", "bob", "q"), DeliveryMode::Blocking).unwrap();
        mb.cancel(&sent.message_id).unwrap();
        let err = mb.await_reply(sent.reply.unwrap()).await.unwrap_err();
        assert!(matches!(err, MailboxError::Cancelled { .. }));
        assert!(mb.cancel(&sent.message_id).is_err());
    }

    #[tokio::test]
    async fn cancel_all_for_waiter() {
        let mb = mailbox();
        let a = mb.send(note("alice", "bob", "q1"), DeliveryMode::Blocking).unwrap();
        let _b = mb.send(note("alice", "carol", "q2"), DeliveryMode::Blocking).unwrap();
        let _c = mb.send(note("carol", "bob", "q3"), DeliveryMode::Blocking).unwrap();
        assert_eq!(mb.cancel_all("alice"), 2);
        assert_eq!(mb.pending_count(), 1);
        assert!(mb.await_reply(a.reply.unwrap()).await.is_err());
    }

    #[test]
    fn reply_after_timeout_is_still_delivered_as_mail() {
        let mb = mailbox();
        let sent = mb.send(note("alice", "bob", "q"), DeliveryMode::Blocking).unwrap();
        mb.expire(&sent.message_id);
        mb.reply(&sent.message_id, MailBody::new("late")).unwrap();
        assert_eq!(mb.unread_count("alice"), 1);
    }

    #[test]
    fn thread_collects_replies() {
        let mb = mailbox();
        let first = mb.send(note("alice", "bob", "start"), DeliveryMode::FireAndForget).unwrap();
        let r1 = mb.reply(&first.message_id, MailBody::new("answer")).unwrap();
        let r2 = mb.reply(&r1, MailBody::new("follow-up")).unwrap();
        mb.send(note("carol", "bob", "unrelated"), DeliveryMode::FireAndForget).unwrap();

        let thread = mb.thread(&r2).unwrap();
        let contents: Vec<&str> = thread.iter().map(|m| m.body.content.as_str()).collect();
        assert_eq!(contents, vec!["start", "answer", "follow-up"]);
    }

    #[test]
    fn archive_marks_status() {
        let mb = mailbox();
        let sent = mb.send(note("alice", "bob", "x"), DeliveryMode::FireAndForget).unwrap();
        mb.archive("bob", &sent.message_id).unwrap();
        assert_eq!(mb.all_mail("bob")[0].status, MailStatus::Archived);
        assert_eq!(mb.unread_count("bob"), 0);
        assert!(mb.archive("alice", &sent.message_id).is_err());
    }

    #[test]
    fn empty_content_is_invalid() {
        let mb = mailbox();
        assert!(matches!(
            mb.send(note("alice", "bob", "  "), DeliveryMode::FireAndForget),
            Err(MailboxError::InvalidMessage(_))
        ));
    }
}
