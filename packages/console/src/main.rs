//! Line-oriented front-end for the course governance client.
//!
//! ```text
//! console            # in-process service, nothing to configure
//! console --remote   # HTTP agent, settings from duniversity.toml / DUNIVERSITY_*
//! ```

use std::env;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use api::{
    random_principal, AgentFactory, ClientFactory, Identity, Principal, ProfileDraft, Role, Settings,
};
use client::{
    AuthError, Command, IdentityProvider, LoginOptions, NotificationLevel, Session,
    SessionSnapshot,
};
use store::MemoryService;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  login [role] [principal]       authenticate, optionally requesting a role
  logout
  status                         identity, role and profile
  refresh
  courses                        courses with the actions offered on each
  users                          role listing (admins)
  create <title> | <description>
  propose|vote|approve|reject|enroll <course-id>
  assign <principal> <role>
  profile <name> [| bio [| email [| github]]]
  help
  quit";

/// Authenticates as whichever principal the user named last, or a fresh one.
#[derive(Clone, Default)]
struct ConsoleIdentityProvider {
    next: Arc<Mutex<Option<Principal>>>,
    current: Arc<Mutex<Option<Identity>>>,
}

impl ConsoleIdentityProvider {
    fn choose(&self, principal: Option<Principal>) {
        *self.next.lock().unwrap_or_else(|p| p.into_inner()) = principal;
    }
}

impl IdentityProvider for ConsoleIdentityProvider {
    async fn restore(&self) -> Result<Option<Identity>, AuthError> {
        Ok(self.current.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    async fn authenticate(&self, options: &LoginOptions) -> Result<Identity, AuthError> {
        tracing::info!(
            provider = %options.identity_provider,
            ttl_secs = options.max_time_to_live.as_secs(),
            "authenticating"
        );
        let principal = self
            .next
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .unwrap_or_else(random_principal);
        let identity = Identity::new(principal, None);
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let provider = ConsoleIdentityProvider::default();
    let remote = env::args().skip(1).any(|arg| arg == "--remote");

    if remote {
        let settings = Settings::new().context("failed to load duniversity settings")?;
        tracing::info!(network = ?settings.network, host = %settings.host, "using remote service");
        let options = LoginOptions::from_settings(&settings);
        let session = Session::create(provider.clone(), AgentFactory::new(settings), options).await;
        run(session, provider).await;
    } else {
        let deployer = random_principal();
        println!("in-process service; admin principal is {deployer}");
        let service = MemoryService::new(deployer);
        let session = Session::create(provider.clone(), service, LoginOptions::default()).await;
        run(session, provider).await;
    }
    Ok(())
}

async fn run<F: ClientFactory>(
    mut session: Session<ConsoleIdentityProvider, F>,
    provider: ConsoleIdentityProvider,
) {
    println!("{HELP}");
    print_notifications(&mut session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match verb {
            "quit" | "exit" => break,
            "help" => println!("{HELP}"),
            "login" => {
                if let Err(message) = login(&mut session, &provider, rest).await {
                    println!("{message}");
                }
            }
            "logout" => session.logout().await,
            "status" => print_status(session.snapshot()),
            "refresh" => {
                session.refresh().await;
            }
            "courses" => print_courses(&session),
            "users" => print_users(session.snapshot()),
            "create" => {
                let (title, description) = rest.split_once('|').unwrap_or((rest, ""));
                let _ = session
                    .dispatch(Command::CreateCourse {
                        title: title.trim().to_string(),
                        description: description.trim().to_string(),
                    })
                    .await;
            }
            "propose" | "vote" | "approve" | "reject" | "enroll" => {
                let id = rest.to_string();
                let command = match verb {
                    "propose" => Command::ProposeCourse(id),
                    "vote" => Command::VoteForCourse(id),
                    "approve" => Command::ApproveCourse(id),
                    "reject" => Command::RejectCourse(id),
                    _ => Command::EnrollInCourse(id),
                };
                let _ = session.dispatch(command).await;
            }
            "assign" => {
                let (principal, role) = rest.rsplit_once(' ').unwrap_or((rest, ""));
                match Role::parse_loose(role) {
                    Some(role) => {
                        let _ = session
                            .dispatch(Command::AssignRole {
                                principal: principal.to_string(),
                                role,
                            })
                            .await;
                    }
                    None => println!("usage: assign <principal> <admin|professor|student|guest>"),
                }
            }
            "profile" => {
                let mut fields = rest.split('|').map(str::trim);
                let mut draft = ProfileDraft::new(fields.next().unwrap_or_default());
                if let Some(bio) = fields.next() {
                    draft = draft.with_bio(bio);
                }
                if let Some(email) = fields.next() {
                    draft = draft.with_contact_email(email);
                }
                if let Some(github) = fields.next() {
                    draft = draft.with_github_username(github);
                }
                let _ = session.dispatch(Command::SaveProfile(draft)).await;
            }
            other => println!("unknown command '{other}', try 'help'"),
        }
        print_notifications(&mut session);
    }
}

/// `login [role] [principal]`. Naming a principal is only possible while logged out.
async fn login<F: ClientFactory>(
    session: &mut Session<ConsoleIdentityProvider, F>,
    provider: &ConsoleIdentityProvider,
    args: &str,
) -> Result<(), String> {
    let mut role = None;
    let mut chosen = None;
    for word in args.split_whitespace() {
        if let Some(parsed) = Role::parse_loose(word) {
            role = Some(parsed);
        } else {
            let principal = Principal::from_text(word)
                .map_err(|e| format!("not a role or principal: {word} ({e})"))?;
            chosen = Some(principal);
        }
    }
    if chosen.is_some() && session.is_authenticated() {
        return Err("already logged in; logout first to switch principal".to_string());
    }
    provider.choose(chosen);
    let _ = session.login(role).await;
    Ok(())
}

fn print_notifications<F: ClientFactory>(session: &mut Session<ConsoleIdentityProvider, F>) {
    for notification in session.drain_notifications() {
        match notification.level {
            NotificationLevel::Error => eprintln!("[{}] {}", notification.level, notification.message),
            _ => println!("[{}] {}", notification.level, notification.message),
        }
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    match &snapshot.principal {
        Some(principal) if snapshot.is_signed_in() => println!("principal: {principal}"),
        _ => println!("not logged in"),
    }
    println!("role: {}", snapshot.role);
    match &snapshot.profile {
        Some(profile) => {
            println!("name: {}", profile.name);
            let absent = "not provided";
            println!("bio: {}", profile.bio.as_deref().unwrap_or(absent));
            println!("email: {}", profile.contact_email.as_deref().unwrap_or(absent));
            println!("github: {}", profile.github_username.as_deref().unwrap_or(absent));
        }
        None => println!("no profile"),
    }
}

fn print_courses<F: ClientFactory>(session: &Session<ConsoleIdentityProvider, F>) {
    let snapshot = session.snapshot();
    if snapshot.courses.is_empty() {
        println!("no courses");
    }
    for course in &snapshot.courses {
        let actions: Vec<String> = session
            .offered_commands(&course.id)
            .into_iter()
            .map(|action| format!("{action:?}").to_lowercase())
            .collect();
        let created = course
            .created_at_utc()
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:<10} {:<9} votes={:<3} enrolled={:<3} {} ({}) by {} [{}]",
            course.id,
            course.status.to_string(),
            course.vote_count,
            course.enrolled_students.len(),
            course.title,
            created,
            course.professor_id,
            actions.join(", ")
        );
    }
    let mine = snapshot
        .principal
        .as_ref()
        .map_or(0, |me| snapshot.courses_owned_by(me).count());
    println!(
        "{} open for voting, {} approved, {} created by you",
        snapshot.open_for_voting().count(),
        snapshot.approved_courses().count(),
        mine
    );
    if !snapshot.enrolled_courses.is_empty() {
        let ids: Vec<&str> = snapshot.enrolled_courses.iter().map(|c| c.id.as_str()).collect();
        println!("enrolled in: {}", ids.join(", "));
    }
}

fn print_users(snapshot: &SessionSnapshot) {
    if snapshot.users.is_empty() {
        println!("no user listing for role {}", snapshot.role);
        return;
    }
    for assignment in &snapshot.users {
        println!("{:<64} {}", assignment.principal.to_text(), assignment.role);
    }
    println!("{} principals registered", snapshot.principals.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_refuses_to_switch_principal_while_logged_in() {
        let admin = Principal::from_slice(&[1; 10]);
        let other = Principal::from_slice(&[2; 10]);
        let provider = ConsoleIdentityProvider::default();
        let mut session = Session::create(
            provider.clone(),
            MemoryService::new(admin),
            LoginOptions::default(),
        )
        .await;

        login(&mut session, &provider, &admin.to_text()).await.unwrap();
        assert_eq!(session.role(), Role::Admin);

        let err = login(&mut session, &provider, &format!("student {other}"))
            .await
            .unwrap_err();
        assert!(err.contains("logout first"));
        assert_eq!(session.snapshot().principal, Some(admin));

        session.logout().await;
        login(&mut session, &provider, &format!("student {other}"))
            .await
            .unwrap();
        assert_eq!(session.snapshot().principal, Some(other));
        assert_eq!(session.role(), Role::Student);
    }

    #[tokio::test]
    async fn test_login_rejects_unparseable_words() {
        let provider = ConsoleIdentityProvider::default();
        let mut session = Session::create(
            provider.clone(),
            MemoryService::new(random_principal()),
            LoginOptions::default(),
        )
        .await;

        assert!(login(&mut session, &provider, "nobody").await.is_err());
        assert!(!session.is_authenticated());
    }
}
