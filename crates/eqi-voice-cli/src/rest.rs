//! One-shot commands against the REST surface.

use crate::settings::Settings;
use anyhow::Result;
use clap::Args;
use eqi_voice_client::TutorApi;

#[derive(Args, Debug)]
pub struct TextArgs {
    /// Reuse an existing session instead of creating one
    #[arg(long)]
    pub session_id: Option<i64>,

    /// The learner's message
    pub text: String,
}

#[derive(Args, Debug)]
pub struct ObjectivesArgs {
    /// Filter by curriculum unit
    #[arg(long)]
    pub unit: Option<String>,

    /// Free-text filter over code and description
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Scope to one session
    #[arg(long)]
    pub session_id: Option<i64>,
}

pub async fn run_session(settings: &Settings) -> Result<()> {
    let api = TutorApi::new(&settings.base_url)?;
    let session_id = api.start_session().await?;
    println!("{session_id}");
    Ok(())
}

pub async fn run_text(settings: &Settings, args: TextArgs) -> Result<()> {
    let api = TutorApi::new(&settings.base_url)?;
    let session_id = match args.session_id {
        Some(id) => id,
        None => api.start_session().await?,
    };

    let reply = api.text_turn(session_id, &args.text).await?;
    println!("tutor: {}", reply.text);
    println!(
        "tone {} | pacing {} | difficulty {} | style {} | next {}",
        reply.mcp.tone, reply.mcp.pacing, reply.mcp.difficulty, reply.mcp.style, reply.mcp.next_step
    );
    if let Some(reward) = reply.reward {
        println!("reward: {reward:.3}");
    }
    Ok(())
}

pub async fn run_objectives(settings: &Settings, args: ObjectivesArgs) -> Result<()> {
    let api = TutorApi::new(&settings.base_url)?;
    let objectives = api.objectives(args.unit.as_deref(), args.query.as_deref()).await?;

    if objectives.is_empty() {
        eprintln!("no objectives matched");
        return Ok(());
    }
    for obj in objectives {
        let description = obj.description.as_deref().unwrap_or("-");
        match obj.unit.as_deref() {
            Some(unit) => println!("{:<12} [{unit}] {description}", obj.objective_code),
            None => println!("{:<12} {description}", obj.objective_code),
        }
    }
    Ok(())
}

pub async fn run_metrics(settings: &Settings, args: MetricsArgs) -> Result<()> {
    let api = TutorApi::new(&settings.base_url)?;
    let snap = api.metrics(args.session_id).await?;

    println!("turns:               {}", snap.turns_total);
    println!("avg reward:          {:.3}", snap.avg_reward);
    println!("last 10 reward avg:  {:.3}", snap.last_10_reward_avg);
    println!("frustration adapt:   {:.1}%", snap.frustration_adaptation_rate * 100.0);
    println!("tone alignment:      {:.1}%", snap.tone_alignment_rate * 100.0);
    if !snap.by_emotion.is_empty() {
        let mut emotions: Vec<_> = snap.by_emotion.iter().collect();
        emotions.sort_by(|a, b| b.1.cmp(a.1));
        println!("by emotion:");
        for (label, count) in emotions {
            println!("  {label:<12} {count}");
        }
    }
    Ok(())
}
