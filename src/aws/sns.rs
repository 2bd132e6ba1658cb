//! Notification topic backed by SNS.

use aws_sdk_sns::Client;
use aws_sdk_sns::types::Tag;

use super::AwsContext;
use super::error::{build_error, classify, missing_field};
use crate::provider::{
    ProviderError, ProviderFuture, Readiness, ResourceHandle, ResourceKind, ResourceProvider,
    SecondaryCall,
};
use crate::spec::{PROJECT_TAGS, TopicSpec};

const SUBSCRIBE_ALERT_EMAIL: &str = "subscribe-alert-email";

const KIND: ResourceKind = ResourceKind::Topic;

/// Returns `true` when `arn` names the topic `name`.
fn arn_names_topic(arn: &str, name: &str) -> bool {
    arn.rsplit(':').next() == Some(name)
}

/// Topic provider. SNS has no lookup by name, so describe scans the topic
/// list for an ARN ending in the name. Creation is synchronous.
#[derive(Clone, Debug)]
pub struct TopicProvider {
    client: Client,
}

impl TopicProvider {
    /// Creates a provider from a loaded context.
    #[must_use]
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sns_client(),
        }
    }

    async fn find(&self, name: &str) -> Result<Option<ResourceHandle>, ProviderError> {
        let mut next_token = None;
        loop {
            let page = self
                .client
                .list_topics()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|err| classify(KIND, "ListTopics", name, &err))?;
            if let Some(arn) = page
                .topics()
                .iter()
                .filter_map(|topic| topic.topic_arn())
                .find(|arn| arn_names_topic(arn, name))
            {
                return Ok(Some(ResourceHandle::new(arn)));
            }
            next_token = page.next_token().map(str::to_owned);
            if next_token.is_none() {
                return Ok(None);
            }
        }
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<ResourceHandle, ProviderError> {
        let tags = PROJECT_TAGS
            .iter()
            .map(|(key, value)| Tag::builder().key(*key).value(*value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| build_error(KIND, "CreateTopic", err))?;
        let output = self
            .client
            .create_topic()
            .name(&spec.name)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|err| classify(KIND, "CreateTopic", &spec.name, &err))?;
        let arn = output
            .topic_arn()
            .ok_or_else(|| missing_field(KIND, "CreateTopic", "topic ARN"))?;
        Ok(ResourceHandle::new(arn))
    }

    async fn subscribe(&self, topic_arn: &str, spec: &TopicSpec) -> Result<(), ProviderError> {
        let Some(email) = spec.alert_email.as_deref() else {
            return Ok(());
        };
        self.client
            .subscribe()
            .topic_arn(topic_arn)
            .protocol("email")
            .endpoint(email)
            .send()
            .await
            .map_err(|err| classify(KIND, "Subscribe", &spec.name, &err))?;
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), ProviderError> {
        let handle = self
            .find(name)
            .await?
            .ok_or_else(|| ProviderError::not_found(KIND, name))?;
        self.client
            .delete_topic()
            .topic_arn(&handle.id)
            .send()
            .await
            .map_err(|err| classify(KIND, "DeleteTopic", name, &err))?;
        Ok(())
    }
}

impl ResourceProvider for TopicProvider {
    type Spec = TopicSpec;

    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn describe<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<ResourceHandle>> {
        Box::pin(self.find(name))
    }

    fn create<'a>(&'a self, spec: &'a TopicSpec) -> ProviderFuture<'a, ResourceHandle> {
        Box::pin(self.create_topic(spec))
    }

    fn delete<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.delete_topic(name))
    }

    fn is_ready<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, bool> {
        Box::pin(async move { Ok(self.find(name).await?.is_some()) })
    }

    fn readiness(&self) -> Readiness {
        Readiness::Immediate
    }

    fn secondary_calls(&self, spec: &TopicSpec) -> Vec<SecondaryCall> {
        if spec.alert_email.is_some() {
            vec![SecondaryCall::optional(SUBSCRIBE_ALERT_EMAIL)]
        } else {
            Vec::new()
        }
    }

    fn apply<'a>(
        &'a self,
        call: SecondaryCall,
        spec: &'a TopicSpec,
        handle: &'a ResourceHandle,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            match call.name {
                SUBSCRIBE_ALERT_EMAIL => self.subscribe(&handle.id, spec).await,
                other => Err(ProviderError::transport(KIND, other, "unsupported call")),
            }
        })
    }
}
