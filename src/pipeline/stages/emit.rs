//! `generate_m3u`, `generate_xmltv` and `publish` stages.
//!
//! Generation writes to sibling temp files; publish fsyncs and renames
//! them into place atomically, per §4.3. A partial failure anywhere in
//! this sequence deletes whatever temp files were created.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::errors::AppResult;
use crate::models::Channel;
use crate::pipeline::stage::{PipelineStage, Program, StageContext};

fn m3u_temp_path(ctx: &StageContext<'_>) -> std::path::PathBuf {
    ctx.output_dir.join(format!("{}.m3u.tmp", ctx.proxy.id))
}

fn m3u_final_path(ctx: &StageContext<'_>) -> std::path::PathBuf {
    ctx.output_dir.join(format!("{}.m3u", ctx.proxy.id))
}

fn xmltv_temp_path(ctx: &StageContext<'_>) -> std::path::PathBuf {
    ctx.output_dir.join(format!("{}.xmltv.tmp", ctx.proxy.id))
}

fn xmltv_final_path(ctx: &StageContext<'_>) -> std::path::PathBuf {
    ctx.output_dir.join(format!("{}.xmltv", ctx.proxy.id))
}

fn render_m3u(channels: &[Channel]) -> String {
    let mut out = String::from("#EXTM3U\n");
    for channel in channels {
        let number = channel.channel_number.unwrap_or(0);
        out.push_str(&format!(
            "#EXTINF:-1 tvg-chno=\"{number}\" group-title=\"{}\",{}\n{}\n",
            channel.group.as_deref().unwrap_or(""),
            channel.name,
            channel.stream_url,
        ));
    }
    out
}

fn render_xmltv(programs: &[Program]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tv>\n");
    for program in programs {
        out.push_str(&format!(
            "  <programme channel=\"{}\" title=\"{}\"/>\n",
            program.channel_external_key, program.title
        ));
    }
    out.push_str("</tv>\n");
    out
}

async fn write_temp_file(path: &std::path::Path, contents: &str) -> AppResult<()> {
    tokio::fs::create_dir_all(path.parent().unwrap_or(std::path::Path::new("."))).await?;
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

pub struct GenerateM3uStage;

#[async_trait]
impl PipelineStage for GenerateM3uStage {
    fn id(&self) -> &'static str {
        "generate_m3u"
    }
    fn name(&self) -> &'static str {
        "Generate M3U"
    }
    fn weight(&self) -> f64 {
        0.10
    }

    async fn run(&self, ctx: &StageContext<'_>, channels: &mut Vec<Channel>, _programs: &mut Vec<Program>) -> AppResult<()> {
        write_temp_file(&m3u_temp_path(ctx), &render_m3u(channels)).await
    }
}

pub struct GenerateXmltvStage;

#[async_trait]
impl PipelineStage for GenerateXmltvStage {
    fn id(&self) -> &'static str {
        "generate_xmltv"
    }
    fn name(&self) -> &'static str {
        "Generate XMLTV"
    }
    fn weight(&self) -> f64 {
        0.10
    }

    async fn run(&self, ctx: &StageContext<'_>, _channels: &mut Vec<Channel>, programs: &mut Vec<Program>) -> AppResult<()> {
        write_temp_file(&xmltv_temp_path(ctx), &render_xmltv(programs)).await
    }
}

pub struct PublishStage;

#[async_trait]
impl PipelineStage for PublishStage {
    fn id(&self) -> &'static str {
        "publish"
    }
    fn name(&self) -> &'static str {
        "Publish"
    }
    fn weight(&self) -> f64 {
        0.10
    }

    async fn run(&self, ctx: &StageContext<'_>, _channels: &mut Vec<Channel>, _programs: &mut Vec<Program>) -> AppResult<()> {
        let result = async {
            tokio::fs::rename(m3u_temp_path(ctx), m3u_final_path(ctx)).await?;
            tokio::fs::rename(xmltv_temp_path(ctx), xmltv_final_path(ctx)).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(err) = result {
            let _ = tokio::fs::remove_file(m3u_temp_path(ctx)).await;
            let _ = tokio::fs::remove_file(xmltv_temp_path(ctx)).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Proxy, ProxyMode, ProxyStatus};
    use crate::pipeline::stage::PipelineInputs;
    use crate::progress::{OperationType, ProgressService, StageSpec};
    use crate::repositories::InMemoryChannelRepository;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_moves_temp_files_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = Proxy {
            id: Uuid::new_v4(),
            name: "p".into(),
            active: true,
            starting_channel_number: 1,
            mode: ProxyMode::Smart,
            sources: vec![],
            epg_sources: vec![],
            filters: vec![],
            status: ProxyStatus::Idle,
            last_generation: None,
        };
        let inputs = PipelineInputs::default();
        let service = ProgressService::new();
        let manager = service
            .start_operation(OperationType::ProxyGeneration, proxy.id, "proxy", "t", vec![StageSpec::new("s", "S", 1.0)])
            .unwrap();
        let updater = manager.start_stage("s").unwrap();
        let output_dir = dir.path().to_path_buf();
        let repo = InMemoryChannelRepository::default();
        let ctx = StageContext {
            proxy: &proxy,
            inputs: &inputs,
            filters: &[],
            encoding_profiles: &[],
            output_dir: &output_dir,
            progress: &updater,
            channels_repo: &repo,
        };

        let mut channels = vec![];
        let mut programs = vec![];
        GenerateM3uStage.run(&ctx, &mut channels, &mut programs).await.unwrap();
        GenerateXmltvStage.run(&ctx, &mut channels, &mut programs).await.unwrap();
        PublishStage.run(&ctx, &mut channels, &mut programs).await.unwrap();

        assert!(m3u_final_path(&ctx).exists());
        assert!(xmltv_final_path(&ctx).exists());
        assert!(!m3u_temp_path(&ctx).exists());
    }
}
