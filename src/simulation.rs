use async_stream::stream;
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use weft_doc::{commands, Document, EditorState, Marks, Transaction};
use weft_sdk::{Client, ClientConfigBuilder, MemoryTransport, PeerId, Relay, SdkError};

/// Statistics collected during a simulation run
#[derive(Clone, Debug)]
pub struct SimulationStats {
    pub num_clients: usize,
    pub edits_attempted: usize,
    pub edits_applied: usize,
    pub log_len: usize,
    pub total_time: Duration,
    pub avg_edit_time: Duration,
    pub converged: bool,
}

impl SimulationStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Simulation Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Clients:                   {:>30} ║", self.num_clients);
        println!("║  Edits attempted:           {:>30} ║", self.edits_attempted);
        println!("║  Edits applied:             {:>30} ║", self.edits_applied);
        println!("║  Relay log length:          {:>30} ║", self.log_len);
        println!("║  Total time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average edit time:         {:>28}µs ║", self.avg_edit_time.as_micros());
        println!("║  Converged:                 {:>30} ║", self.converged);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

#[derive(Clone, Copy, Debug)]
enum EditKind {
    Insert,
    Delete,
    Split,
    Join,
    Bold,
    Unbold,
}

/// One randomized edit, with positions relative to the document size.
#[derive(Clone, Copy, Debug)]
struct EditPlan {
    client: usize,
    kind: EditKind,
    at: f64,
    len: usize,
}

/// Generator that yields edits for random clients
fn edit_generator(num_clients: usize, num_edits: usize, seed: u64) -> impl Stream<Item = EditPlan> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..num_edits {
            let kind = match rng.gen_range(0..10) {
                0..=3 => EditKind::Insert,
                4 | 5 => EditKind::Delete,
                6 => EditKind::Split,
                7 => EditKind::Join,
                8 => EditKind::Bold,
                _ => EditKind::Unbold,
            };
            yield EditPlan {
                client: rng.gen_range(0..num_clients),
                kind,
                at: rng.gen_range(0.0..1.0),
                len: rng.gen_range(1..5),
            };
        }
    }
}

fn build_edit(state: &EditorState, plan: EditPlan) -> weft_doc::Result<Transaction> {
    let size = state.doc().content_size();
    let pos = ((size as f64) * plan.at) as usize;
    let to = (pos + plan.len).min(size);
    match plan.kind {
        EditKind::Insert => commands::insert_text(state, pos, &"x".repeat(plan.len), &Marks::new()),
        EditKind::Delete => commands::delete_range(state, pos, to),
        EditKind::Split => commands::split_block(state, pos),
        EditKind::Join => commands::join_blocks(state, pos),
        EditKind::Bold => commands::add_mark(state, pos, to, "bold", json!(true)),
        EditKind::Unbold => commands::remove_mark(state, pos, to, "bold"),
    }
}

/// Wait until every client has its edits confirmed and matches the relay.
async fn settle(relay: &Relay, clients: &[Arc<Client<MemoryTransport>>], timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let doc = relay.doc();
        if clients.iter().all(|c| c.pending_len() == 0 && c.doc() == doc) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Random edits from several clients through one relay, then a convergence check
pub async fn simulate(num_clients: usize, num_edits: usize, seed: u64) -> Result<SimulationStats, SdkError> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Collaborative Editing Simulation                    ║");
    println!("║  Clients: {} | Edits: {} | Seed: {} ║", num_clients, num_edits, seed);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let doc = Document::from_paragraphs(&["Hello world.", "A second paragraph."]);
    let relay = Relay::new(doc)?;

    let mut clients = Vec::with_capacity(num_clients);
    for i in 0..num_clients {
        let name = format!("client-{i}");
        let config = ClientConfigBuilder::new().client_id(name.clone()).build();
        let client = Client::connect(config, relay.connect(PeerId::new(name))?).await?;
        clients.push(Arc::new(client));
    }

    println!("\n[Phase 1/2] Editing...");

    let mut edit_times = Vec::with_capacity(num_edits);
    let mut edits_applied = 0;
    let mut edits = Box::pin(edit_generator(num_clients, num_edits, seed));
    let mut attempted = 0;
    while let Some(plan) = edits.next().await {
        attempted += 1;
        let edit_start = Instant::now();
        match clients[plan.client].edit(|state| build_edit(state, plan)) {
            Ok(Some(_)) => edits_applied += 1,
            Ok(None) => {}
            // Random positions often miss valid structure.
            Err(SdkError::Edit(_)) => {}
            Err(err) => return Err(err),
        }
        edit_times.push(edit_start.elapsed());

        if attempted % 8 == 0 {
            tokio::task::yield_now().await;
        }
        if attempted % 100 == 0 {
            println!("  Edits attempted: {}/{}", attempted, num_edits);
        }
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Waiting for convergence...");

    let converged = settle(&relay, &clients, Duration::from_secs(10)).await;
    if converged {
        info!(log_len = relay.log_len(), "All clients converged");
    } else {
        warn!(log_len = relay.log_len(), "Clients did not converge");
    }
    for client in &clients {
        let parity = client.with_replica(|r| r.outline().len() == r.doc().structural_size());
        if !parity {
            warn!(client_id = %client.client_id(), "Outline length differs from document");
        }
    }

    let avg_edit_time = if edit_times.is_empty() {
        Duration::ZERO
    } else {
        edit_times.iter().sum::<Duration>() / edit_times.len() as u32
    };

    println!("[Phase 2/2] ✓ Completed");

    Ok(SimulationStats {
        num_clients,
        edits_attempted: attempted,
        edits_applied,
        log_len: relay.log_len(),
        total_time: start.elapsed(),
        avg_edit_time,
        converged,
    })
}

/// Simulation runs with a growing number of clients
pub async fn simulate_scaling(max_clients: usize, step_size: usize) -> Result<Vec<SimulationStats>, SdkError> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Edits vs Clients                   ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut runs = Vec::new();
    let mut current = step_size;
    while current <= max_clients {
        let stats = simulate(current, current * 50, current as u64).await?;
        stats.print();
        runs.push(stats);
        current += step_size;
    }
    Ok(runs)
}
