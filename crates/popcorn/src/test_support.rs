//! 🧪 Shared fixtures. Supernatural: 15 seasons, 327 episodes, zero chill.

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::lookup::ProviderConfig;

pub(crate) const SUPERNATURAL_SEASONS: [i32; 15] =
    [22, 22, 16, 22, 22, 22, 23, 23, 23, 23, 23, 23, 23, 20, 20];
pub(crate) const SUPERNATURAL_EPISODES: usize = 327;

pub(crate) fn provider_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        api_host: None,
        api_key: "imdb8-api-key".to_string(),
        fetch_episodes: true,
        timeout_secs: Some(5),
        connect_timeout_secs: None,
    }
}

pub(crate) fn find_body() -> Value {
    json!({
        "@meta": {"operationID": "DC2", "requestId": "0b7c1b64"},
        "query": "supernatural",
        "results": [
            {
                "id": "/title/tt0460681/",
                "image": {"height": 1500, "width": 1013},
                "numberOfEpisodes": 327,
                "runningTimeInMinutes": 44,
                "seriesEndYear": 2020,
                "seriesStartYear": 2005,
                "title": "Supernatural",
                "titleType": "tvSeries",
                "year": 2005
            },
            {
                "id": "/title/tt0120179/",
                "title": "Supernatural",
                "titleType": "movie",
                "year": 1933
            }
        ]
    })
}

pub(crate) fn seasons_body() -> Value {
    let seasons: Vec<Value> = SUPERNATURAL_SEASONS
        .iter()
        .enumerate()
        .map(|(index, count)| {
            let season = index as i32 + 1;
            let episodes: Vec<Value> = (1..=*count)
                .map(|episode| {
                    json!({
                        "id": format!("/title/tt{:07}/", season * 1000 + episode),
                        "season": season,
                        "episode": episode,
                        "titleType": "tvEpisode"
                    })
                })
                .collect();
            json!({"id": "/title/tt0460681/", "season": season, "episodes": episodes})
        })
        .collect();
    Value::Array(seasons)
}

/// 🎬 Mounts both provider endpoints for "Supernatural" on a wiremock server.
pub(crate) async fn mount_supernatural(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/title/find"))
        .and(query_param("q", "Supernatural"))
        .respond_with(ResponseTemplate::new(200).set_body_json(find_body()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/title/get-seasons"))
        .and(query_param("tconst", "tt0460681"))
        .respond_with(ResponseTemplate::new(200).set_body_json(seasons_body()))
        .mount(server)
        .await;
}
