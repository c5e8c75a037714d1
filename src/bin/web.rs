//! Single binary web server exposing elimination tournaments over REST.
//! Run with: cargo run --bin web
//! Listens on 0.0.0.0:8080 by default. Override with env: HOST, PORT.
//! The item catalog is read from CATALOG_CSV (default: data/catalog.csv).

use actix_web::{
    delete, get, post,
    web::{Data, Json, Path},
    App, HttpResponse, HttpServer, Responder,
};
use chrono::Utc;
use elimination_tournament::{
    BracketEvent, Catalog, EliminationOrchestrator, Item, MatchOutcome, MatchesByRound,
    MemoryTransport, Placements, Player, PlayerId, StaticCatalog, TournamentConfig,
    TournamentError, TournamentId, TournamentState,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Per-tournament entry: the orchestrator, its transport and last activity time.
struct TournamentEntry {
    orchestrator: EliminationOrchestrator,
    transport: Arc<MemoryTransport>,
    last_activity: Instant,
}

type Tournaments = RwLock<HashMap<TournamentId, TournamentEntry>>;

struct Shared {
    tournaments: Tournaments,
    catalog: Arc<dyn Catalog>,
}

type AppState = Data<Shared>;

/// Tournaments not accessed for this long are removed.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(12 * 3600);

/// How often match supervisors are advanced.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

/// What the API returns for a tournament.
#[derive(Serialize)]
struct TournamentView<'a> {
    id: TournamentId,
    state: TournamentState,
    config: &'a TournamentConfig,
    players: &'a [Player],
    matches: MatchesByRound,
    placements: Option<&'a Placements>,
}

impl<'a> TournamentView<'a> {
    fn of(orchestrator: &'a EliminationOrchestrator) -> Self {
        Self {
            id: orchestrator.id,
            state: orchestrator.state(),
            config: orchestrator.config(),
            players: orchestrator.players(),
            matches: orchestrator.get_matches_by_round(),
            placements: orchestrator.placements(),
        }
    }
}

#[derive(Deserialize)]
struct AddPlayerBody {
    name: String,
}

#[derive(Deserialize)]
struct ReportResultBody {
    player_a: PlayerId,
    player_b: PlayerId,
    outcome: MatchOutcome,
    #[serde(default)]
    score: (u32, u32),
    #[serde(default)]
    loser_team: Option<Vec<Item>>,
}

#[derive(Deserialize)]
struct ReportBattleBody {
    winner: PlayerId,
    loser: PlayerId,
    #[serde(default = "default_battle_score")]
    score: (u32, u32),
    winner_team: Vec<Item>,
    loser_team: Vec<Item>,
}

fn default_battle_score() -> (u32, u32) {
    (1, 0)
}

#[derive(Deserialize)]
struct MatchStartedBody {
    player_a: PlayerId,
    player_b: PlayerId,
}

#[derive(Deserialize)]
struct DisqualifyEntry {
    player_id: PlayerId,
    reason: String,
}

#[derive(Deserialize)]
struct DisqualifyBody {
    players: Vec<DisqualifyEntry>,
}

#[derive(Deserialize)]
struct PresenceBody {
    present: bool,
}

#[derive(Deserialize)]
struct TournamentPath {
    id: TournamentId,
}

#[derive(Deserialize)]
struct TournamentPlayerPath {
    id: TournamentId,
    player_id: PlayerId,
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "No tournament" }))
}

fn bad_request(e: TournamentError) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() }))
}

fn lock_error() -> HttpResponse {
    HttpResponse::InternalServerError().body("lock error")
}

#[get("/api/health")]
async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        service: "elimination-tournament",
    })
}

/// Create a tournament. The body is a (possibly partial) tournament config.
#[post("/api/tournaments")]
async fn api_create_tournament(
    state: AppState,
    body: Option<Json<TournamentConfig>>,
) -> HttpResponse {
    let config = body.map(Json::into_inner).unwrap_or_default();
    if let Err(e) = config.validate() {
        return bad_request(e);
    }
    let transport = Arc::new(MemoryTransport::new());
    let mut orchestrator =
        EliminationOrchestrator::new(config, Arc::clone(&state.catalog), transport.clone());
    let id = orchestrator.id;
    orchestrator.on_match_available(move |event| {
        if let BracketEvent::MatchAvailable(view) = event {
            log::info!("[{}] round {} match ready at node {}", id, view.round, view.node);
        }
    });
    orchestrator.on_tournament_end(move |event| {
        if let BracketEvent::TournamentEnded { winner } = event {
            log::info!("[{}] finished, winner: {:?}", id, winner);
        }
    });

    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = g.entry(id).or_insert(TournamentEntry {
        orchestrator,
        transport,
        last_activity: Instant::now(),
    });
    HttpResponse::Ok().json(TournamentView::of(&entry.orchestrator))
}

/// Get a tournament by id. Touching it refreshes last_activity.
#[get("/api/tournaments/{id}")]
async fn api_get_tournament(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    match g.get_mut(&path.id) {
        Some(entry) => {
            entry.last_activity = Instant::now();
            HttpResponse::Ok().json(TournamentView::of(&entry.orchestrator))
        }
        None => not_found(),
    }
}

/// Sign up a player (Setup only).
#[post("/api/tournaments/{id}/players")]
async fn api_add_player(
    state: AppState,
    path: Path<TournamentPath>,
    body: Json<AddPlayerBody>,
) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    match t.add_player(body.name.as_str()) {
        Ok(_) => HttpResponse::Ok().json(TournamentView::of(t)),
        Err(e) => bad_request(e),
    }
}

/// Remove a signup (Setup only).
#[delete("/api/tournaments/{id}/players/{player_id}")]
async fn api_remove_player(state: AppState, path: Path<TournamentPlayerPath>) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    match t.remove_player(path.player_id) {
        Ok(()) => HttpResponse::Ok().json(TournamentView::of(t)),
        Err(e) => bad_request(e),
    }
}

/// Build the bracket and open the first matches (Setup -> InProgress).
#[post("/api/tournaments/{id}/start")]
async fn api_start_tournament(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    match t.start(Utc::now()) {
        Ok(()) => HttpResponse::Ok().json(TournamentView::of(t)),
        Err(e) => bad_request(e),
    }
}

/// Record a result reported by the host.
#[post("/api/tournaments/{id}/results")]
async fn api_report_result(
    state: AppState,
    path: Path<TournamentPath>,
    body: Json<ReportResultBody>,
) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    let body = body.into_inner();
    match t.report_result(
        body.player_a,
        body.player_b,
        body.outcome,
        body.score,
        body.loser_team,
        Utc::now(),
    ) {
        Ok(()) => HttpResponse::Ok().json(TournamentView::of(t)),
        Err(e) => bad_request(e),
    }
}

/// Record a finished battle after checking both teams.
#[post("/api/tournaments/{id}/battles")]
async fn api_report_battle(
    state: AppState,
    path: Path<TournamentPath>,
    body: Json<ReportBattleBody>,
) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    match t.report_battle(
        body.winner,
        body.loser,
        body.score,
        &body.winner_team,
        &body.loser_team,
        Utc::now(),
    ) {
        Ok(violations) => {
            let violations: Vec<String> = violations.iter().map(ToString::to_string).collect();
            HttpResponse::Ok().json(serde_json::json!({
                "violations": violations,
                "tournament": TournamentView::of(t),
            }))
        }
        Err(e) => bad_request(e),
    }
}

/// Stop the activity timers of a match that has begun.
#[post("/api/tournaments/{id}/matches/started")]
async fn api_match_started(
    state: AppState,
    path: Path<TournamentPath>,
    body: Json<MatchStartedBody>,
) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    match t.record_match_started(body.player_a, body.player_b, Utc::now()) {
        Ok(()) => HttpResponse::Ok().json(TournamentView::of(t)),
        Err(e) => bad_request(e),
    }
}

/// Disqualify a batch of players.
#[post("/api/tournaments/{id}/disqualify")]
async fn api_disqualify(
    state: AppState,
    path: Path<TournamentPath>,
    body: Json<DisqualifyBody>,
) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    let batch = body
        .into_inner()
        .players
        .into_iter()
        .map(|d| (d.player_id, d.reason));
    match t.disqualify(batch, Utc::now()) {
        Ok(()) => HttpResponse::Ok().json(TournamentView::of(t)),
        Err(e) => bad_request(e),
    }
}

/// Mark a player as present (or absent) in the venue for liveness checks.
#[post("/api/tournaments/{id}/players/{player_id}/presence")]
async fn api_set_presence(
    state: AppState,
    path: Path<TournamentPlayerPath>,
    body: Json<PresenceBody>,
) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    if entry.orchestrator.player(path.player_id).is_none() {
        return bad_request(TournamentError::PlayerNotFound(path.player_id));
    }
    entry.transport.set_present(path.player_id, body.present);
    HttpResponse::NoContent().finish()
}

/// Messages the transport delivered to one player.
#[get("/api/tournaments/{id}/players/{player_id}/messages")]
async fn api_player_messages(state: AppState, path: Path<TournamentPlayerPath>) -> HttpResponse {
    let g = match state.tournaments.read() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    match g.get(&path.id) {
        Some(entry) => HttpResponse::Ok().json(entry.transport.notifications_for(path.player_id)),
        None => not_found(),
    }
}

/// A player's team state: possible teams, change log and item pool.
#[get("/api/tournaments/{id}/players/{player_id}/team")]
async fn api_player_team(state: AppState, path: Path<TournamentPlayerPath>) -> HttpResponse {
    let g = match state.tournaments.read() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let Some(entry) = g.get(&path.id) else {
        return not_found();
    };
    match entry.orchestrator.team_state(path.player_id) {
        Some(team) => HttpResponse::Ok().json(team),
        None => bad_request(TournamentError::PlayerNotFound(path.player_id)),
    }
}

#[get("/api/tournaments/{id}/matches")]
async fn api_matches(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    let g = match state.tournaments.read() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    match g.get(&path.id) {
        Some(entry) => HttpResponse::Ok().json(entry.orchestrator.get_matches_by_round()),
        None => not_found(),
    }
}

#[get("/api/tournaments/{id}/bracket")]
async fn api_bracket(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    let g = match state.tournaments.read() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    match g.get(&path.id) {
        Some(entry) => HttpResponse::Ok().json(entry.orchestrator.get_bracket_snapshot()),
        None => not_found(),
    }
}

/// Cancel a tournament. The final bracket stays readable.
#[post("/api/tournaments/{id}/force-end")]
async fn api_force_end(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    let mut g = match state.tournaments.write() {
        Ok(guard) => guard,
        Err(_) => return lock_error(),
    };
    let entry = match g.get_mut(&path.id) {
        Some(e) => e,
        None => return not_found(),
    };
    entry.last_activity = Instant::now();
    let t = &mut entry.orchestrator;
    match t.force_end() {
        Ok(()) => HttpResponse::Ok().json(TournamentView::of(t)),
        Err(e) => bad_request(e),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_catalog_path() -> String {
    "data/catalog.csv".to_string()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let host = std::env::var("HOST").unwrap_or_else(|_| default_host());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(default_port);
    let catalog_path = std::env::var("CATALOG_CSV").unwrap_or_else(|_| default_catalog_path());

    let catalog = StaticCatalog::from_path(&catalog_path).map_err(|e| {
        log::error!("Could not load catalog from {}: {}", catalog_path, e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })?;
    log::info!("Loaded {} catalog entries from {}", catalog.len(), catalog_path);

    let state = Data::new(Shared {
        tournaments: RwLock::new(HashMap::new()),
        catalog: Arc::new(catalog),
    });

    // Drive every match supervisor forward on a fixed cadence.
    let state_tick = state.clone();
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let mut g = match state_tick.tournaments.write() {
                Ok(guard) => guard,
                Err(_) => continue,
            };
            let now = Utc::now();
            for (id, entry) in g.iter_mut() {
                for verdict in entry.orchestrator.tick(now) {
                    log::info!(
                        "[{}] node {}: disqualified {} player(s) for inactivity",
                        id,
                        verdict.node,
                        verdict.disqualify.len()
                    );
                }
            }
        }
    });

    // Every 30 minutes, remove tournaments inactive for 12+ hours.
    let state_cleanup = state.clone();
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30 * 60));
        loop {
            interval.tick().await;
            let mut g = match state_cleanup.tournaments.write() {
                Ok(guard) => guard,
                Err(_) => continue,
            };
            let before = g.len();
            g.retain(|_, entry| entry.last_activity.elapsed() < INACTIVITY_TIMEOUT);
            let removed = before - g.len();
            if removed > 0 {
                log::info!("Cleaned up {} inactive tournament(s) (no activity for 12h)", removed);
            }
        }
    });

    log::info!("Starting server at http://{}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(api_health)
            .service(api_create_tournament)
            .service(api_get_tournament)
            .service(api_add_player)
            .service(api_remove_player)
            .service(api_start_tournament)
            .service(api_report_result)
            .service(api_report_battle)
            .service(api_match_started)
            .service(api_disqualify)
            .service(api_set_presence)
            .service(api_player_messages)
            .service(api_player_team)
            .service(api_matches)
            .service(api_bracket)
            .service(api_force_end)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
