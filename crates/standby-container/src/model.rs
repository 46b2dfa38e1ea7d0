//! コンテナランタイムとやり取りする型

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 解決済みのコンテナ参照（毎サイクル解決し直す）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, short_id(&self.id))
    }
}

/// 実行中コンテナの一覧項目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    /// 作成日時（UNIX秒）
    pub created: i64,
}

impl ContainerSummary {
    pub fn to_ref(&self) -> ContainerRef {
        ContainerRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// マウントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
    Tmpfs,
}

/// マウント定義
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MountSpec {
    pub kind: MountKind,
    /// バインドはホストパス、ボリュームはボリューム名
    pub source: String,
    pub destination: String,
    /// Docker が報告するモード文字列（例: "z", "rw"）
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub read_only: bool,
}

/// プライマリから複製するランタイム設定
///
/// ラベルはキー順、マウントは宛先パス順に正規化されているため、
/// 同じコンテナから取得したスナップショットは常に等しくなる。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImageSpec {
    pub image: String,
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<MountSpec>,
}

impl ContainerImageSpec {
    pub fn normalize(mut self) -> Self {
        self.mounts.sort_by(|a, b| a.destination.cmp(&b.destination).then(a.cmp(b)));
        self
    }
}

/// inspect の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub running: bool,
    /// イメージダイジェスト（sha256:...）
    pub image_id: Option<String>,
    pub spec: ContainerImageSpec,
}

impl ContainerDetails {
    pub fn to_ref(&self) -> ContainerRef {
        ContainerRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// イメージの同一性を示す値（ダイジェスト、なければイメージ参照）
    pub fn image_identity(&self) -> Option<String> {
        self.image_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| Some(self.spec.image.clone()).filter(|image| !image.is_empty()))
    }
}

/// コンテナ内コマンドの実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
}

/// レプリカ作成リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaRequest {
    pub name: String,
    /// プライマリのスナップショット（そのまま使う）
    pub spec: ContainerImageSpec,
    /// プライマリが実際に動かしているイメージID（sha256:...）
    ///
    /// タグは後から別のイメージを指しうるため、作成にはこちらを優先する。
    pub image_id: Option<String>,
    pub network: String,
    /// スナップショットのラベルに上書きで追加するラベル
    pub extra_labels: BTreeMap<String, String>,
}

impl ReplicaRequest {
    /// 作成に使うイメージ（IDがなければ参照）
    pub fn image_to_run(&self) -> &str {
        self.image_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.spec.image)
    }

    /// 実際にコンテナに付与されるラベル
    pub fn effective_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.spec.labels.clone();
        labels.extend(
            self.extra_labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        labels
    }
}

/// コンテナIDを12文字に短縮
pub fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    &id[..id.len().min(12)]
}

/// イメージダイジェストを表示用に短縮（sha256:xxxxxxxxxxxx）
pub fn short_digest(digest: &str) -> String {
    match digest.strip_prefix("sha256:") {
        Some(hex) => format!("sha256:{}", &hex[..hex.len().min(12)]),
        None => digest.to_string(),
    }
}
