use std::collections::HashMap;

use texting_robots::Robot;
use tokio::sync::Mutex;
use url::Url;

/// robots.txt rules, fetched once per origin.
///
/// A missing or unreadable robots.txt allows everything.
pub struct Robots {
    user_agent: String,
    rules: Mutex<HashMap<String, Option<Robot>>>,
}

impl Robots {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            rules: Mutex::new(HashMap::new()),
        }
    }

    pub async fn allowed(&self, client: &reqwest::Client, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        let mut rules = self.rules.lock().await;
        if !rules.contains_key(&origin) {
            let robot = fetch_robot(client, &origin, &self.user_agent).await;
            rules.insert(origin.clone(), robot);
        }
        match rules.get(&origin) {
            Some(Some(robot)) => robot.allowed(url.as_str()),
            _ => true,
        }
    }
}

async fn fetch_robot(client: &reqwest::Client, origin: &str, user_agent: &str) -> Option<Robot> {
    let robots_url = format!("{origin}/robots.txt");
    let resp = client
        .get(&robots_url)
        .send()
        .await
        .map_err(|e| log::warn!("Couldn't fetch {robots_url} got: {e}"))
        .ok()?;

    if !resp.status().is_success() {
        log::debug!("No robots.txt at {robots_url} ({})", resp.status());
        return None;
    }

    let txt = resp
        .bytes()
        .await
        .map_err(|e| log::warn!("Couldn't read {robots_url} got: {e}"))
        .ok()?;

    Robot::new(user_agent, &txt)
        .map_err(|e| log::warn!("Couldn't parse {robots_url} got: {e}"))
        .ok()
}
