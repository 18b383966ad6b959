//! Several bot processes polling one mailbox.
//!
//! Nothing locks the slot between a poller's read and its clear, so two
//! pollers that both read before either clears will both deliver. These tests
//! pin that down as a property: every command reaches at least one poller and
//! at most all of them, and both the single and double delivery outcomes are
//! reachable.

mod common;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use mailbox_core::{
    Command, CommandKind, HandlerError, MailboxStore, MemoryMailbox, Poller,
};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// One process's view of a shared slot.
///
/// `snapshot` captures the slot content at a chosen moment; the next read
/// returns that capture instead of the live content, as if the read had
/// happened back then. Writes always go straight to the shared slot.
#[derive(Clone)]
struct DelayedView {
    shared: MemoryMailbox,
    captured: Arc<Mutex<Option<Option<String>>>>,
}

impl DelayedView {
    fn new(shared: &MemoryMailbox) -> Self {
        Self {
            shared: shared.clone(),
            captured: Arc::default(),
        }
    }

    fn snapshot(&self) {
        *self.captured.lock() = Some(self.shared.raw());
    }
}

impl MailboxStore for DelayedView {
    fn location(&self) -> String {
        "delayed-view".to_string()
    }

    fn load_text(&self) -> io::Result<Option<String>> {
        match self.captured.lock().take() {
            Some(captured) => Ok(captured),
            None => self.shared.load_text(),
        }
    }

    fn store_text(&self, text: &str) -> io::Result<()> {
        self.shared.store_text(text)
    }
}

fn counting_handler(
    deliveries: Arc<AtomicUsize>,
) -> impl FnMut(&Command) -> Result<(), HandlerError> + Send {
    move |_: &Command| -> Result<(), HandlerError> {
        deliveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Step {
    Read,
    DeliverAndClear,
}

const STEPS: [Step; 2] = [Step::Read, Step::DeliverAndClear];

/// Publish one command, then interleave two pollers' read and
/// deliver-and-clear steps in a random order. Returns the delivery count.
fn run_interleaving(rng: &mut SmallRng, command: &Command) -> usize {
    let shared = MemoryMailbox::new();
    let deliveries = Arc::new(AtomicUsize::new(0));
    let views = [DelayedView::new(&shared), DelayedView::new(&shared)];
    let mut pollers = [
        Poller::new(views[0].clone(), counting_handler(deliveries.clone())),
        Poller::new(views[1].clone(), counting_handler(deliveries.clone())),
    ];
    shared.publish(command).expect("publish");

    let mut progress = [0usize; 2];
    while progress.iter().any(|&done| done < STEPS.len()) {
        let who = match (progress[0] < STEPS.len(), progress[1] < STEPS.len()) {
            (true, true) => usize::from(rng.gen_bool(0.5)),
            (true, false) => 0,
            _ => 1,
        };
        match STEPS[progress[who]] {
            Step::Read => views[who].snapshot(),
            Step::DeliverAndClear => {
                pollers[who].poll().expect("clear succeeds");
            }
        }
        progress[who] += 1;
    }

    assert!(shared.read().is_empty(), "slot is consumed in every schedule");
    deliveries.load(Ordering::SeqCst)
}

#[test]
fn two_pollers_deliver_at_least_once_and_at_most_twice() {
    let mut rng = SmallRng::seed_from_u64(0x6d61_696c_626f_78);
    let command = Command::targeted("all", CommandKind::Pause);
    let mut histogram = [0usize; 3];

    for _ in 0..256 {
        let delivered = run_interleaving(&mut rng, &command);
        assert!(
            (1..=2).contains(&delivered),
            "command delivered {delivered} times"
        );
        histogram[delivered] += 1;
    }

    assert!(histogram[1] > 0, "some schedules deliver exactly once");
    assert!(
        histogram[2] > 0,
        "some schedules deliver to both pollers; the mailbox has no consumption lock"
    );
}

#[test]
fn sequential_pollers_deliver_exactly_once() {
    let shared = MemoryMailbox::new();
    let deliveries = Arc::new(AtomicUsize::new(0));
    let mut first = Poller::new(shared.clone(), counting_handler(deliveries.clone()));
    let mut second = Poller::new(shared.clone(), counting_handler(deliveries.clone()));

    shared
        .publish(&Command::new(CommandKind::Ping))
        .expect("publish");
    first.poll().expect("first poller");
    second.poll().expect("second poller");

    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
}

#[test]
fn threaded_pollers_on_one_file() {
    let (_dir, mailbox) = common::temp_mailbox();
    let deliveries = Arc::new(AtomicUsize::new(0));
    mailbox
        .publish(&Command::new(CommandKind::StopWork))
        .expect("publish");

    let start = Arc::new(Barrier::new(2));
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let mailbox = mailbox.clone();
            let deliveries = deliveries.clone();
            let start = start.clone();
            thread::spawn(move || {
                let mut poller = Poller::new(mailbox, counting_handler(deliveries));
                start.wait();
                poller.poll().expect("poll");
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("poller thread");
    }

    let delivered = deliveries.load(Ordering::SeqCst);
    assert!(
        (1..=2).contains(&delivered),
        "command delivered {delivered} times"
    );
    assert!(mailbox.read().is_empty());
}
