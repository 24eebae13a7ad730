use std::sync::Arc;

use desire_client::client::config::ClientConfig;
use desire_client::client::models::conversation::{start_conversation, ConversationList, ConversationSync, ConversationView};
use desire_client::client::models::feed::{ActionOutcome, CandidateFeed, FeedView};
use desire_client::client::models::likes::LikesBoard;
use desire_client::client::models::notifications::{NotificationInbox, UnreadPoller};
use desire_client::client::models::onboarding::{Gender, LookingFor, OnboardingWizard};
use desire_client::client::models::relations::{FavoritesList, MatchesList};
use desire_client::client::models::session::{Gate, SessionStore};
use desire_client::client::services::api_client::{ApiClient, DatingApi, ProfileUpdate};
use desire_client::client::services::auth_service::{AuthError, AuthService, LoginDestination, RegisterForm};
use desire_client::client::services::websocket_client::SocketIoConnector;
use desire_client::client::utils::session_store::KeyringStore;
use desire_client::common::models::{EntityId, User};
use log::{error, info};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

const HELP: &str = "\
/login <email> <password>
/register <username> <first> <last> <email> <password> <confirm>
/verify <token>            /resend <email>   /forgot <email>
/reset <token> <password> <confirm>
/password <current> <new> <confirm>   /delete DELETE   /logout
/me           /bio <text>  /user <id>
/onboard <age> <male|female|other> <male|female|both> <interest,...> [city]
/feed [page]  /next  /prev /like <id>  /dislike <id>  /fav <id>
/likes        /likeback <id>
/matches      /favorites   /unfav <id>
/counts       /notifications  /read <id>  /readall
/chats        /start <user_id>  /open <conversation_id>  /send <text>  /close
/help         /quit";

struct App {
    api: Arc<dyn DatingApi>,
    session: SessionStore,
    auth: AuthService,
    feed: CandidateFeed,
    likes: LikesBoard,
    matches: MatchesList,
    favorites: FavoritesList,
    inbox: NotificationInbox,
    chats: ConversationList,
    chat: Arc<ConversationSync>,
    poller: UnreadPoller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    std::env::set_var("RUST_LOG", &config.log_level);
    env_logger::init();

    let credentials = Arc::new(KeyringStore::new(config.keyring_fallback, config.session_dir.clone()));
    let session = SessionStore::new(credentials);
    let api: Arc<dyn DatingApi> = Arc::new(ApiClient::new(&config, session.clone())?);
    let connector = Arc::new(SocketIoConnector::new(config.live_url.clone(), session.clone()));

    session.hydrate(api.as_ref()).await;
    match session.wait_ready().await.gate() {
        Gate::Allow => info!("[CLI] Session restored"),
        _ => println!("Not signed in. Use /login or /register."),
    }

    let chat = Arc::new(ConversationSync::new(api.clone(), connector));
    spawn_chat_printer(chat.clone());

    let app = App {
        auth: AuthService::new(api.clone(), session.clone()),
        feed: CandidateFeed::new(api.clone(), config.page_size),
        likes: LikesBoard::new(api.clone()),
        matches: MatchesList::new(api.clone()),
        favorites: FavoritesList::new(api.clone()),
        inbox: NotificationInbox::new(api.clone()),
        chats: ConversationList::new(api.clone()),
        poller: UnreadPoller::start(api.clone(), session.clone(), config.poll_interval()),
        chat,
        api,
        session,
    };

    println!("{}", HELP);
    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = app.dispatch(line).await {
            error!("[CLI] {}", e);
            println!("Error: {}", e);
        }
    }
    app.chat.close();
    Ok(())
}

/// Prints messages as they land in the open conversation.
fn spawn_chat_printer(chat: Arc<ConversationSync>) {
    let mut revisions = chat.subscribe();
    tokio::spawn(async move {
        let mut shown: Option<(Option<EntityId>, usize)> = None;
        while revisions.changed().await.is_ok() {
            let conversation = chat.conversation_id();
            let messages = chat.messages();
            let start = match &shown {
                Some((c, n)) if *c == conversation => *n,
                _ => 0,
            };
            for m in messages.iter().skip(start) {
                let who = if m.is_from_me { "me" } else { "them" };
                println!("[{}] {}: {}", m.created_at.format("%H:%M"), who, m.message);
            }
            shown = Some((conversation, messages.len().max(start)));
        }
    });
}

fn print_user(user: &User) {
    println!("  {} {}", user.id, user.display_name());
    if let Some(age) = user.age {
        println!("  age: {}", age);
    }
    if let Some(bio) = &user.bio {
        println!("  bio: {}", bio);
    }
    if !user.interests.is_empty() {
        println!("  interests: {}", user.interests.join(", "));
    }
}

fn parse_gender(arg: &str) -> Option<Gender> {
    match arg {
        "male" => Some(Gender::Male),
        "female" => Some(Gender::Female),
        "other" => Some(Gender::Other),
        _ => None,
    }
}

fn parse_looking_for(arg: &str) -> Option<LookingFor> {
    match arg {
        "male" => Some(LookingFor::Male),
        "female" => Some(LookingFor::Female),
        "both" => Some(LookingFor::Both),
        _ => None,
    }
}

fn parse_id(arg: Option<&str>) -> anyhow::Result<EntityId> {
    arg.map(EntityId::from).ok_or_else(|| anyhow::anyhow!("missing id, see /help"))
}

fn report(outcome: ActionOutcome) {
    match outcome {
        ActionOutcome::Applied => println!("Done."),
        ActionOutcome::Matched => println!("It's a match!"),
        ActionOutcome::Busy => println!("Still working on that one."),
        ActionOutcome::AlreadyFavorited => println!("Already in favorites."),
        ActionOutcome::NotInFeed => println!("Not on this page."),
    }
}

impl App {
    async fn dispatch(&self, line: &str) -> anyhow::Result<()> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        let public = ["/login", "/register", "/verify", "/resend", "/forgot", "/reset", "/help"];
        if !public.contains(&command) && !self.session.is_authenticated() {
            println!("You need to /login first.");
            return Ok(());
        }

        match command {
            "/help" => println!("{}", HELP),
            "/login" if args.len() == 2 => match self.auth.login(args[0], args[1]).await {
                Ok(LoginDestination::Onboarding) => println!("Welcome! Finish your profile with /onboard to get started."),
                Ok(LoginDestination::Dashboard) => println!("Welcome back!"),
                Err(AuthError::EmailNotVerified { email }) => {
                    println!("Please verify {} first (check your inbox, or /verify <token>).", email)
                }
                Err(e) => println!("{}", e.user_message("Login failed. Please try again.")),
            },
            "/register" if args.len() == 6 => {
                let form = RegisterForm {
                    username: args[0].to_string(),
                    first_name: args[1].to_string(),
                    last_name: args[2].to_string(),
                    email: args[3].to_string(),
                    password: args[4].to_string(),
                    confirm_password: args[5].to_string(),
                };
                match self.auth.register(&form).await {
                    Ok(email) => println!("Registered. Check {} to verify your account.", email),
                    Err(e) => println!("{}", e.user_message("Registration failed. Please try again.")),
                }
            }
            "/verify" if args.len() == 1 => {
                let user = self.auth.verify_email(args[0]).await?;
                println!("Email verified. Signed in as {}.", user.display_name());
            }
            "/resend" if args.len() == 1 => {
                let note = self.auth.resend_verification(args[0]).await?;
                println!("{}", note.unwrap_or_else(|| "Verification email sent.".to_string()));
            }
            "/forgot" if args.len() == 1 => {
                let note = self.auth.forgot_password(args[0]).await?;
                println!("{}", note.unwrap_or_else(|| "Check your inbox for a reset link.".to_string()));
            }
            "/reset" if args.len() == 3 => {
                self.auth.reset_password(args[0], args[1], args[2]).await?;
                println!("Password reset. You can /login now.");
            }
            "/password" if args.len() == 3 => {
                self.auth.change_password(args[0], args[1], args[2]).await?;
                println!("Password updated.");
            }
            "/delete" => {
                self.chat.close();
                self.auth.delete_account(args.first().copied().unwrap_or("")).await?;
                println!("Account deleted.");
            }
            "/me" => {
                let me = self.api.get_profile().await?;
                print_user(&me);
            }
            "/bio" if !args.is_empty() => {
                let update = ProfileUpdate { bio: Some(args.join(" ")), ..ProfileUpdate::default() };
                self.api.update_profile(&update).await?;
                println!("Profile updated.");
            }
            "/user" => {
                let user = self.api.get_user(&parse_id(args.first().copied())?).await?;
                print_user(&user);
            }
            "/onboard" if args.len() >= 4 => {
                let mut wizard = OnboardingWizard::new();
                wizard.age = args[0].to_string();
                wizard.gender = parse_gender(args[1]);
                wizard.looking_for = parse_looking_for(args[2]);
                for interest in args[3].split(',').filter(|i| !i.is_empty()) {
                    wizard.toggle_interest(interest);
                }
                if args.len() > 4 {
                    wizard.location.city = Some(args[4..].join(" "));
                }
                match wizard.submit(self.api.as_ref()).await {
                    Ok(()) => println!("Profile complete!"),
                    Err(e) => println!("{}", e),
                }
            }
            "/logout" => {
                self.chat.close();
                self.auth.logout();
                println!("Signed out.");
            }
            "/feed" => {
                let page = args.first().and_then(|p| p.parse().ok()).unwrap_or(1);
                self.feed.fetch_page(page).await?;
                self.print_feed();
            }
            "/next" => {
                if self.feed.next_page().await?.is_none() {
                    println!("No more pages.");
                }
                self.print_feed();
            }
            "/prev" => {
                if self.feed.prev_page().await?.is_none() {
                    println!("Already on the first page.");
                }
                self.print_feed();
            }
            "/like" => report(self.feed.like(&parse_id(args.first().copied())?).await?),
            "/dislike" => report(self.feed.dislike(&parse_id(args.first().copied())?).await?),
            "/fav" => report(self.feed.favorite(&parse_id(args.first().copied())?).await?),
            "/likes" => {
                self.likes.load().await?;
                println!("You liked:");
                for l in self.likes.my_likes() {
                    println!("  {} {}{}", l.id, l.first_name.unwrap_or_default(), if l.matched { " (match)" } else { "" });
                }
                println!("Liked you:");
                for l in self.likes.pending_incoming() {
                    println!("  {} {}", l.id, l.first_name.unwrap_or_default());
                }
            }
            "/likeback" => report(self.likes.like_back(&parse_id(args.first().copied())?).await?),
            "/matches" => {
                self.matches.load().await?;
                for m in self.matches.items() {
                    println!("  {} {} {}", m.id, m.first_name.unwrap_or_default(), m.location.label().unwrap_or_default());
                }
            }
            "/favorites" => {
                self.favorites.load().await?;
                for f in self.favorites.items() {
                    let action = if f.matched { "message" } else { "like to message" };
                    println!("  {} {} [{}]", f.id, f.first_name.unwrap_or_default(), action);
                }
            }
            "/unfav" => report(self.favorites.remove(&parse_id(args.first().copied())?).await?),
            "/counts" => {
                let c = self.poller.counts();
                println!(
                    "notifications: {}  messages: {}  likes: {}  matches: {}",
                    c.notifications, c.messages, c.likes, c.matches
                );
            }
            "/notifications" => {
                self.inbox.load().await?;
                for n in self.inbox.items() {
                    println!("  {} {} {}", n.id, if n.is_read { " " } else { "*" }, n.message);
                }
            }
            "/read" => self.inbox.mark_read(&parse_id(args.first().copied())?).await?,
            "/readall" => self.inbox.mark_all_read().await?,
            "/chats" => {
                self.chats.load().await?;
                for c in self.chats.items() {
                    println!("  {} {} ({} unread) {}", c.id, c.title(), c.unread_count, c.last_message.unwrap_or_default());
                }
                println!("{} unread in total", self.chats.unread_total());
            }
            "/start" => {
                let user = parse_id(args.first().copied())?;
                match start_conversation(self.api.as_ref(), &user).await {
                    Ok(started) => match started.conversation_id {
                        Some(id) => {
                            println!("Conversation {} ready.", id);
                            self.chat.open(&id).await?;
                        }
                        None => println!("Conversation started, see /chats."),
                    },
                    Err(e) => println!("{}", e),
                }
            }
            "/open" => {
                self.chat.open(&parse_id(args.first().copied())?).await?;
                if self.chat.view() == ConversationView::Empty {
                    println!("No messages yet. Say hi!");
                }
            }
            "/send" if !args.is_empty() => {
                self.chat.send(&args.join(" ")).await?;
            }
            "/close" => self.chat.close(),
            _ => println!("Unknown command or wrong arguments, see /help"),
        }
        Ok(())
    }

    fn print_feed(&self) {
        match self.feed.view() {
            FeedView::Loading => println!("Loading..."),
            FeedView::Empty => println!("No more profiles right now."),
            FeedView::Failed(msg) => println!("{}", msg),
            FeedView::Ready(candidates) => {
                for c in candidates {
                    println!(
                        "  {} {} {} {}{}",
                        c.id,
                        c.display_name(),
                        c.age.map(|a| a.to_string()).unwrap_or_default(),
                        c.location.label().unwrap_or_default(),
                        if c.is_favorited { " *" } else { "" }
                    );
                }
                if let Some(p) = self.feed.pagination() {
                    println!("page {}/{} ({} people)", p.current_page, p.total_pages, p.total_users);
                }
            }
        }
    }
}
