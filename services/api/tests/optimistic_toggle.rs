//! End-to-end fee toggles: a real server on a loopback port, the reqwest
//! dashboard client, and the optimistic controller.

use api_lib::{
    client::DashboardClient,
    config::{AdminSeed, Config},
    web::{auth::bootstrap_admin, build_router, state::AppState},
};
use fee_tracker_core::{
    memory::InMemoryDatabase, DatabaseService, FeeSemester, Notice, Notifier,
    OptimisticController, Settled, TogglePhase,
};
use rstest::{fixture, rstest};
use serde_json::json;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::Level;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

#[derive(Default)]
struct RecordingNotifier {
    notices: StdMutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notifier lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notifier lock").push(notice);
    }
}

struct Running {
    db: Arc<InMemoryDatabase>,
    base_url: String,
}

#[fixture]
async fn running() -> Running {
    let db = Arc::new(InMemoryDatabase::new());
    let seed = AdminSeed {
        username: "admin".to_string(),
        password: "admin123".to_string(),
    };
    bootstrap_admin(db.as_ref(), &seed).await.expect("admin seeded");

    let config = Config {
        bind_address: "127.0.0.1:0".parse().expect("valid socket address"),
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        log_level: Level::INFO,
        session_secret: SECRET.to_string(),
        cors_origin: "http://localhost:3000".to_string(),
        admin_seed: None,
    };
    let state = Arc::new(AppState {
        db: db.clone(),
        config: Arc::new(config),
    });
    let app = build_router(state).expect("router builds");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Running {
        db,
        base_url: format!("http://{addr}"),
    }
}

async fn logged_in_client(running: &Running) -> Arc<DashboardClient> {
    let client = DashboardClient::new(&running.base_url, Duration::from_secs(5)).expect("client builds");
    client.login("admin", "admin123").await.expect("login succeeds");
    let count = client
        .upload(&[
            json!({ "Enrollment Number": "E1", "Name": "Asha", "Branch": "CSE", "Semester": 3 }),
            json!({ "Enrollment Number": "E2", "Name": "Ravi", "Branch": "ECE", "Semester": 5 }),
        ])
        .await
        .expect("upload succeeds");
    assert_eq!(count, 2);
    Arc::new(client)
}

#[rstest]
#[tokio::test]
async fn confirmed_toggle_reaches_the_server(#[future] running: Running) {
    let running = running.await;
    let client = logged_in_client(&running).await;
    let board = Arc::new(Mutex::new(client.load_board().await.expect("board loads")));
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = OptimisticController::new(board.clone(), client.clone(), notifier.clone());

    let asha = board
        .lock()
        .await
        .students()
        .iter()
        .find(|s| s.enrollment_number == "E1")
        .map(|s| s.id)
        .expect("E1 on board");

    let settled = controller
        .toggle(asha, FeeSemester::Sem2, true)
        .await
        .expect("student is on the board");
    assert_eq!(settled.phase(), TogglePhase::Confirmed);
    assert!(matches!(settled, Settled::Confirmed { paid: true, .. }));

    let on_board = board.lock().await.get(asha).cloned().expect("still on board");
    assert!(on_board.fees.is_paid(FeeSemester::Sem2));
    let on_server = running
        .db
        .list_students()
        .await
        .expect("list")
        .into_iter()
        .find(|s| s.id == asha)
        .expect("on server");
    assert!(on_server.fees.is_paid(FeeSemester::Sem2));
    assert_eq!(
        notifier.notices(),
        vec![Notice::Success("Asha's fee status updated.".to_string())]
    );
}

#[rstest]
#[tokio::test]
async fn failed_write_rolls_back_only_the_toggled_field(#[future] running: Running) {
    let running = running.await;
    let client = logged_in_client(&running).await;
    let board = Arc::new(Mutex::new(client.load_board().await.expect("board loads")));
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = OptimisticController::new(board.clone(), client.clone(), notifier.clone());

    let ravi = board
        .lock()
        .await
        .students()
        .iter()
        .find(|s| s.enrollment_number == "E2")
        .map(|s| s.id)
        .expect("E2 on board");

    controller
        .toggle(ravi, FeeSemester::Sem1, true)
        .await
        .expect("first toggle settles");

    running.db.fail_writes(true);
    let settled = controller
        .toggle(ravi, FeeSemester::Sem4, true)
        .await
        .expect("second toggle settles");
    running.db.fail_writes(false);

    assert_eq!(settled.phase(), TogglePhase::RolledBack);
    let on_board = board.lock().await.get(ravi).cloned().expect("still on board");
    assert!(on_board.fees.is_paid(FeeSemester::Sem1));
    assert!(!on_board.fees.is_paid(FeeSemester::Sem4));
    assert_eq!(board.lock().await.paid_label(ravi).as_deref(), Some("1 / 6"));

    let notices = notifier.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(
        notices[1],
        Notice::Failure("Failed to update status for Ravi. Reverting change.".to_string())
    );
}

#[rstest]
#[tokio::test]
async fn logged_out_client_cannot_write(#[future] running: Running) {
    let running = running.await;
    let client = logged_in_client(&running).await;
    let board = Arc::new(Mutex::new(client.load_board().await.expect("board loads")));
    client.logout().await.expect("logout succeeds");

    let notifier = Arc::new(RecordingNotifier::default());
    let controller = OptimisticController::new(board.clone(), client.clone(), notifier.clone());
    let id = board.lock().await.students()[0].id;

    let settled = controller
        .toggle(id, FeeSemester::Sem6, true)
        .await
        .expect("toggle settles");
    assert_eq!(settled.phase(), TogglePhase::RolledBack);
    assert!(notifier.notices()[0].is_failure());
    assert!(running
        .db
        .list_students()
        .await
        .expect("list")
        .iter()
        .all(|s| !s.fees.is_paid(FeeSemester::Sem6)));
}

#[rstest]
#[tokio::test]
async fn refresh_replaces_the_board_with_the_server_roster(#[future] running: Running) {
    let running = running.await;
    let client = logged_in_client(&running).await;
    let board = Mutex::new(client.load_board().await.expect("board loads"));
    assert_eq!(board.lock().await.students().len(), 2);

    client
        .upload(&[json!({ "Enrollment Number": "E3", "Name": "Meera", "Branch": "ME", "Semester": 1 })])
        .await
        .expect("second upload succeeds");
    client.refresh_board(&board).await.expect("refresh succeeds");

    let board = board.lock().await;
    assert_eq!(board.students().len(), 3);
    assert_eq!(board.students()[0].enrollment_number, "E3");
    assert_eq!(board.branches().len(), 3);
}
