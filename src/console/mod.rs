/// Interactive terminal front end.
///
/// Generic over its input and output so the menus can be driven by a script in
/// tests. Logs go to stderr through `tracing`; everything here writes to `output`.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    db::UserStore,
    error::AppResult,
    models::{catalog, RecommendationItem, UserId, UserRatings, RATEABLE_ITEMS},
    services::{
        RecommendationOrchestrator, RecommendationResponse, RecommendationSource, SharedDeviceState,
    },
};

const RULE: &str = "========================================";
const GUEST: &str = "guest";

struct Session {
    username: String,
    user_id: UserId,
    ratings: UserRatings,
}

/// Terminal menu bound to one orchestrator and user store
pub struct Console<R, W> {
    input: R,
    output: W,
    orchestrator: Arc<RecommendationOrchestrator>,
    store: Arc<dyn UserStore>,
    device: SharedDeviceState,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        input: R,
        output: W,
        orchestrator: Arc<RecommendationOrchestrator>,
        store: Arc<dyn UserStore>,
        device: SharedDeviceState,
    ) -> Self {
        Self {
            input,
            output,
            orchestrator,
            store,
            device,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs login and the main menu until the user exits or input ends
    pub async fn run(&mut self) -> AppResult<()> {
        self.say("\nUSER LOGIN").await?;
        self.prompt("Enter your username: ").await?;
        let username = match self.read_line().await? {
            Some(name) if !name.is_empty() => name,
            _ => GUEST.to_string(),
        };

        let stored = self.store.get_or_create(&username).await?;
        let mut session = Session {
            username,
            user_id: stored.user_id,
            ratings: stored.ratings,
        };
        tracing::info!(username = %session.username, user_id = session.user_id, "User logged in");

        if session.ratings.is_empty() {
            self.say(&format!(
                "\nWelcome {}! Let's get to know your taste.",
                session.username
            ))
            .await?;
            self.rate_movies(&mut session).await?;
        }

        loop {
            self.main_menu(&session).await?;
            let Some(choice) = self.read_line().await? else {
                break;
            };

            match choice.as_str() {
                "1" => self.recommendations(&session).await?,
                "2" => self.rate_movies(&mut session).await?,
                "3" => {
                    if !self.interactions(&session).await? {
                        break;
                    }
                }
                "4" => self.compare_models(&session).await?,
                "5" => self.device_status().await?,
                "0" => break,
                other => self.say(&format!("Invalid choice: {}", other)).await?,
            }
        }

        self.say(&format!("\nGoodbye {}!", session.username)).await?;
        Ok(())
    }

    async fn main_menu(&mut self, session: &Session) -> AppResult<()> {
        self.say(&format!("\nMARQUEE - Welcome {}!", session.username)).await?;
        self.say(RULE).await?;
        self.say("1. Get Movie Recommendations").await?;
        self.say("2. Rate More Movies").await?;
        self.say("3. Device Interactions").await?;
        self.say("4. Model Comparison").await?;
        self.say("5. Device Status").await?;
        self.say("0. Exit").await?;
        self.say(RULE).await?;
        self.prompt("\nEnter choice (0-5): ").await
    }

    async fn recommendations(&mut self, session: &Session) -> AppResult<()> {
        self.say("\nGETTING RECOMMENDATIONS").await?;
        let choice = self.orchestrator.select_backend(&session.ratings);
        self.say(&format!("Using the {} model", choice)).await?;

        let response = self
            .orchestrator
            .handle_recommend(session.user_id, &session.ratings)
            .await;
        self.show_response("TOP RECOMMENDATIONS FOR YOU", &response).await?;
        self.say(&format!("Based on your {} ratings", session.ratings.len()))
            .await?;
        if !session.ratings.is_empty() {
            self.say(&format!("Your ratings: {}", session.ratings)).await?;
        }
        Ok(())
    }

    async fn rate_movies(&mut self, session: &mut Session) -> AppResult<()> {
        self.say("\nRATE MOVIES").await?;
        if session.ratings.is_empty() {
            self.say("Let's rate some movies to personalize your experience!")
                .await?;
        } else {
            self.say(&format!(
                "You've rated {} movies. Rate more to improve!",
                session.ratings.len()
            ))
            .await?;
        }

        for (number, id) in RATEABLE_ITEMS.iter().enumerate() {
            if let Some(entry) = catalog::find(*id) {
                self.say(&format!("{}. {}", number + 1, entry.title)).await?;
                self.say(&format!("   Genres: {}", entry.genres)).await?;
            }
        }
        self.say(&format!(
            "\nEnter '<movie 1-{}> <rating 1-5>' per line, or 'done' to finish:",
            RATEABLE_ITEMS.len()
        ))
        .await?;

        let mut added = UserRatings::new();
        while let Some(line) = self.read_line().await? {
            if line.eq_ignore_ascii_case("done") {
                break;
            }
            if line.is_empty() {
                continue;
            }
            match parse_rating_line(&line) {
                Ok((id, rating)) => {
                    // parse_rating_line already range-checked the rating
                    if added.rate(id, rating).is_ok() {
                        let title = catalog::find(id).map(|e| e.title).unwrap_or("?");
                        self.say(&format!("Rated '{}' with {} stars", title, rating))
                            .await?;
                    }
                }
                Err(message) => self.say(&format!("Skipped '{}': {}", line, message)).await?,
            }
        }

        if added.is_empty() {
            self.say("No new ratings.").await?;
            return Ok(());
        }

        session.ratings.merge(&added);
        match self.store.save(&session.username, &session.ratings).await {
            Ok(()) => self.say(&format!("Saved {} ratings!", added.len())).await?,
            Err(e) => {
                tracing::warn!(username = %session.username, error = %e, "Could not save ratings");
                self.say("Could not save your ratings; they will last for this session only.")
                    .await?;
            }
        }

        let accepted = self
            .orchestrator
            .handle_rating(session.user_id, &session.ratings)
            .await;
        if accepted > 0 {
            self.say("Models updated with your ratings.").await?;
        } else {
            self.say("Models could not be updated; popular titles will be shown.")
                .await?;
        }
        Ok(())
    }

    /// Returns false when input ended inside the submenu
    async fn interactions(&mut self, session: &Session) -> AppResult<bool> {
        loop {
            self.say("\nDEVICE INTERACTIONS").await?;
            self.say(RULE).await?;
            self.say("1. Voice command").await?;
            self.say("2. Tilt gesture").await?;
            self.say("3. Button press").await?;
            self.say("4. All combined").await?;
            self.say("0. Back").await?;
            self.prompt("\nEnter choice (0-4): ").await?;

            let Some(choice) = self.read_line().await? else {
                return Ok(false);
            };
            let (user_id, ratings) = (session.user_id, &session.ratings);
            let response = match choice.as_str() {
                "1" => self.orchestrator.handle_voice(user_id, ratings).await,
                "2" => self.orchestrator.handle_tilt(user_id, ratings).await,
                "3" => self.orchestrator.handle_button(user_id, ratings).await,
                "4" => self.orchestrator.handle_multi_sensory(user_id, ratings).await,
                "0" => return Ok(true),
                other => {
                    self.say(&format!("Invalid choice: {}", other)).await?;
                    continue;
                }
            };
            self.show_response("DEVICE RECOMMENDATIONS", &response).await?;
        }
    }

    async fn compare_models(&mut self, session: &Session) -> AppResult<()> {
        self.say("\nMODEL COMPARISON").await?;
        let comparison = self
            .orchestrator
            .handle_comparison(session.user_id, &session.ratings)
            .await;

        self.show_response("PRIMARY", &comparison.primary).await?;
        self.show_response("SECONDARY", &comparison.secondary).await?;
        self.say(&comparison.status).await
    }

    async fn device_status(&mut self) -> AppResult<()> {
        let snapshot = self.device.read();
        let (timeouts, lingering) = {
            let executor = self.orchestrator.executor();
            (executor.timeouts(), executor.lingering())
        };
        self.say(&format!("\n{}", snapshot)).await?;
        self.say(&format!(
            "Backend timeouts: {}  still running: {}",
            timeouts, lingering
        ))
        .await
    }

    async fn show_response(&mut self, heading: &str, response: &RecommendationResponse) -> AppResult<()> {
        let origin = match &response.source {
            RecommendationSource::Backend { name, .. } => name.to_string(),
            RecommendationSource::Fallback { .. } => catalog::FALLBACK_LABEL.to_string(),
        };
        self.say(&format!("\n{} ({}):", heading, origin)).await?;
        self.say(RULE).await?;
        for (rank, item) in response.items.iter().enumerate() {
            self.say(&format_item(rank + 1, item)).await?;
        }
        self.say(&response.status).await
    }

    async fn say(&mut self, line: &str) -> AppResult<()> {
        self.output.write_all(line.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    async fn prompt(&mut self, text: &str) -> AppResult<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Next trimmed line, `None` at end of input
    async fn read_line(&mut self) -> AppResult<Option<String>> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

fn format_item(rank: usize, item: &RecommendationItem) -> String {
    format!(
        "{}. {}\n   Genres: {}\n   Score: {:.1}  [{}]",
        rank,
        item.title,
        item.genres_joined(),
        item.score,
        item.source_label
    )
}

/// Parses "<menu number> <rating>" into a catalog id and rating
fn parse_rating_line(line: &str) -> Result<(crate::models::ItemId, crate::models::Rating), String> {
    let mut parts = line.split_whitespace();
    let (Some(number), Some(rating), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("expected '<movie> <rating>'".to_string());
    };

    let number: usize = number
        .parse()
        .map_err(|_| format!("'{}' is not a movie number", number))?;
    let id = number
        .checked_sub(1)
        .and_then(|index| RATEABLE_ITEMS.get(index))
        .copied()
        .ok_or_else(|| format!("movie number must be 1-{}", RATEABLE_ITEMS.len()))?;

    let rating: crate::models::Rating = rating
        .parse()
        .map_err(|_| format!("'{}' is not a rating", rating))?;
    let mut check = UserRatings::new();
    check.rate(id, rating)?;

    Ok((id, rating))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::JsonUserStore;
    use crate::services::{
        BackendSet, BoundedExecutor, InteractionRecorder, InteractionTiming, OrchestratorConfig,
    };
    use std::time::Duration;
    use tokio::io::BufReader;
    use uuid::Uuid;

    struct Harness {
        orchestrator: Arc<RecommendationOrchestrator>,
        store: Arc<JsonUserStore>,
        device: SharedDeviceState,
        path: std::path::PathBuf,
    }

    async fn harness(backends: Option<BackendSet>) -> Harness {
        let path = std::env::temp_dir().join(format!("marquee-console-{}.json", Uuid::new_v4()));
        let device = SharedDeviceState::default();
        let recorder = InteractionRecorder::new(device.clone(), InteractionTiming::instant());
        let config = OrchestratorConfig {
            deadline: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        };
        Harness {
            orchestrator: Arc::new(RecommendationOrchestrator::new(
                backends,
                BoundedExecutor::new(),
                recorder,
                config,
            )),
            store: Arc::new(JsonUserStore::open(&path).await),
            device,
            path,
        }
    }

    async fn run_script(h: &Harness, script: &str) -> String {
        let mut console = Console::new(
            BufReader::new(script.as_bytes()),
            Vec::new(),
            h.orchestrator.clone(),
            h.store.clone(),
            h.device.clone(),
        );
        console.run().await.unwrap();
        String::from_utf8(console.into_output()).unwrap()
    }

    #[test]
    fn test_parse_rating_line() {
        assert_eq!(parse_rating_line("1 5"), Ok((1, 5)));
        assert_eq!(parse_rating_line("8   2"), Ok((350, 2)));
        assert!(parse_rating_line("9 5").is_err());
        assert!(parse_rating_line("0 5").is_err());
        assert!(parse_rating_line("1 6").is_err());
        assert!(parse_rating_line("1").is_err());
        assert!(parse_rating_line("one five").is_err());
        assert!(parse_rating_line("1 5 5").is_err());
    }

    #[tokio::test]
    async fn test_new_user_rates_then_gets_recommendations() {
        let h = harness(Some(BackendSet::standard())).await;
        let out = run_script(&h, "alice\n1 5\n2 4\nbogus\n6 5\ndone\n1\n0\n").await;

        assert!(out.contains("Welcome alice! Let's get to know your taste."));
        assert!(out.contains("Rated 'Toy Story' with 5 stars"));
        assert!(out.contains("Skipped 'bogus'"));
        assert!(out.contains("Saved 3 ratings!"));
        // Three ratings route to the secondary model
        assert!(out.contains("Using the secondary model"));
        assert!(out.contains("TOP RECOMMENDATIONS FOR YOU (Neural CF)"));
        assert!(out.contains("Goodbye alice!"));

        let stored = h.store.get_or_create("alice").await.unwrap();
        assert_eq!(stored.ratings.len(), 3);
        assert_eq!(stored.ratings.get(250), Some(5));

        let counters = h.device.read().counters;
        // Rating submission records a voice event, the recommendation a button event
        assert_eq!(counters.voice, 1);
        assert_eq!(counters.button, 1);

        let _ = tokio::fs::remove_file(&h.path).await;
    }

    #[tokio::test]
    async fn test_blank_username_logs_in_as_guest() {
        let h = harness(None).await;
        let out = run_script(&h, "\ndone\n0\n").await;

        assert!(out.contains("Welcome guest!"));
        assert!(out.contains("No new ratings."));
        assert!(!h.store.get_or_create("guest").await.unwrap().created);

        let _ = tokio::fs::remove_file(&h.path).await;
    }

    #[tokio::test]
    async fn test_interaction_submenu_and_fallback() {
        let h = harness(None).await;
        let out = run_script(&h, "bob\ndone\n3\n1\n2\n3\n4\n7\n0\n0\n").await;

        assert!(out.contains("DEVICE INTERACTIONS"));
        assert!(out.contains("DEVICE RECOMMENDATIONS (Popular)"));
        assert!(out.contains("Invalid choice: 7"));
        assert!(out.contains("The Usual Suspects"));

        let counters = h.device.read().counters;
        assert_eq!(counters.voice, 2);
        assert_eq!(counters.tilt, 2);
        assert_eq!(counters.button, 2);
        assert_eq!(counters.multi_sensory, 1);

        let _ = tokio::fs::remove_file(&h.path).await;
    }

    #[tokio::test]
    async fn test_comparison_and_status() {
        let h = harness(Some(BackendSet::standard())).await;
        let out = run_script(&h, "carol\n1 5\ndone\n4\n5\n0\n").await;

        assert!(out.contains("PRIMARY (Matrix Factorization)"));
        assert!(out.contains("SECONDARY (Neural CF)"));
        assert!(out.contains("Model comparison complete"));
        assert!(out.contains("Backend timeouts: 0"));

        let _ = tokio::fs::remove_file(&h.path).await;
    }

    #[tokio::test]
    async fn test_end_of_input_exits_cleanly() {
        let h = harness(None).await;
        let out = run_script(&h, "dave\ndone\n3\n").await;
        assert!(out.contains("Goodbye dave!"));

        let _ = tokio::fs::remove_file(&h.path).await;
    }
}
