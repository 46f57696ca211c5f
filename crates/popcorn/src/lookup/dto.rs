//! 📡 Provider wire shapes. Only the fields we read are declared; serde ignores the rest.

use serde::Deserialize;
use serde_json::Value;

use crate::common::Episode;

/// `GET /title/find?q=...`
///
/// 🎭 Results are a mixed bag: titles, and people (`/name/nm.../` with a `name`
/// and no `title`). They stay raw until the first one is picked.
#[derive(Debug, Deserialize)]
pub(super) struct FindResponse {
    #[serde(default)]
    pub(super) results: Vec<Value>,
}

/// 🎬 The first find result, once its id has proven it is a title.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FindResult {
    pub(super) title: String,
    #[serde(default)]
    pub(super) number_of_episodes: Option<u32>,
}

/// `GET /title/get-seasons?tconst=...` returns a bare array of these.
#[derive(Debug, Deserialize)]
pub(super) struct SeasonDto {
    #[serde(default)]
    pub(super) episodes: Vec<EpisodeDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct EpisodeDto {
    pub(super) season: i32,
    pub(super) episode: i32,
}

/// 🥞 Seasons in, one flat list out. Provider order is trusted: no sort, no dedup.
pub(super) fn flatten_seasons(seasons: Vec<SeasonDto>) -> Vec<Episode> {
    seasons
        .into_iter()
        .flat_map(|season| season.episodes)
        .map(|dto| Episode {
            season: dto.season,
            episode: dto.episode,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_seasons_flatten_in_the_order_they_arrived() -> anyhow::Result<()> {
        // 🎲 deliberately out of order, with a duplicate. we are not the provider's editor.
        let seasons: Vec<SeasonDto> = serde_json::from_value(serde_json::json!([
            {"season": 2, "episodes": [{"season": 2, "episode": 1, "title": "In My Time of Dying"}]},
            {"season": 1, "episodes": [
                {"season": 1, "episode": 2},
                {"season": 1, "episode": 1},
                {"season": 1, "episode": 1}
            ]},
            {"season": 3}
        ]))?;

        let flat = flatten_seasons(seasons);
        let pairs: Vec<(i32, i32)> = flat.iter().map(|e| (e.season, e.episode)).collect();
        assert_eq!(pairs, vec![(2, 1), (1, 2), (1, 1), (1, 1)]);
        Ok(())
    }

    #[test]
    fn the_one_where_a_find_response_without_results_is_just_empty() -> anyhow::Result<()> {
        let response: FindResponse = serde_json::from_str(r#"{"query":"zzz"}"#)?;
        assert!(response.results.is_empty());
        Ok(())
    }

    #[test]
    fn the_one_where_a_cast_member_in_the_results_is_not_a_problem() -> anyhow::Result<()> {
        let response: FindResponse = serde_json::from_value(serde_json::json!({
            "results": [
                {"id": "/title/tt0460681/", "title": "Supernatural", "numberOfEpisodes": 327},
                {"id": "/name/nm0655585/", "name": "Jared Padalecki"}
            ]
        }))?;
        assert_eq!(response.results.len(), 2);

        let first: FindResult = serde_json::from_value(response.results[0].clone())?;
        assert_eq!(first.title, "Supernatural");
        assert_eq!(first.number_of_episodes, Some(327));
        Ok(())
    }
}
