use anyhow::Result;
use serde::Serialize;
use std::process;

use calofit_core::estimation::extract_calories;

use crate::config::Config;
use crate::yandexgpt::YandexGptClient;

#[derive(Serialize)]
struct EstimateOutput<'a> {
    input: &'a str,
    answer: &'a str,
    calories: Option<i64>,
}

/// One estimation round trip, bypassing both caches.
pub(crate) async fn cmd_estimate(config: &Config, text: &str, json: bool) -> Result<()> {
    let client = YandexGptClient::new(&config.estimator()?, tokio::runtime::Handle::current())?;
    let answer = client.complete_async(text).await?;
    let calories = extract_calories(&answer);

    if json {
        let output = EstimateOutput {
            input: text,
            answer: &answer,
            calories,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Answer:   {answer}");
    match calories {
        Some(calories) => println!("Calories: {calories}"),
        None => {
            eprintln!("No calorie number in the answer");
            process::exit(2);
        }
    }
    Ok(())
}
