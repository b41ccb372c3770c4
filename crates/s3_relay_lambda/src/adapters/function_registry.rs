use aws_sdk_lambda::error::DisplayErrorContext;

use crate::runtime::trigger_plan::InvokePermissionGrant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionRevocation {
    Removed,
    NotFound,
}

/// Lambda control-plane calls the trigger configurator needs.
pub trait FunctionRegistry {
    fn function_arn(&self, function_name: &str) -> Result<String, String>;

    /// Removing a statement that does not exist is reported as
    /// [`PermissionRevocation::NotFound`], not as an error.
    fn revoke_invoke_permission(
        &self,
        function_name: &str,
        statement_id: &str,
    ) -> Result<PermissionRevocation, String>;

    fn grant_invoke_permission(&self, grant: &InvokePermissionGrant) -> Result<(), String>;
}

#[derive(Clone)]
pub struct AwsLambdaFunctionRegistry {
    lambda_client: aws_sdk_lambda::Client,
}

impl AwsLambdaFunctionRegistry {
    pub fn new(lambda_client: aws_sdk_lambda::Client) -> Self {
        Self { lambda_client }
    }
}

impl FunctionRegistry for AwsLambdaFunctionRegistry {
    fn function_arn(&self, function_name: &str) -> Result<String, String> {
        let client = self.lambda_client.clone();
        let name = function_name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_function()
                    .function_name(&name)
                    .send()
                    .await
                    .map_err(|error| {
                        format!(
                            "failed to look up lambda function {name}: {}",
                            DisplayErrorContext(&error)
                        )
                    })?;
                output
                    .configuration()
                    .and_then(|configuration| configuration.function_arn())
                    .map(str::to_string)
                    .ok_or_else(|| format!("lambda function {name} has no function arn"))
            })
        })
    }

    fn revoke_invoke_permission(
        &self,
        function_name: &str,
        statement_id: &str,
    ) -> Result<PermissionRevocation, String> {
        let client = self.lambda_client.clone();
        let name = function_name.to_string();
        let statement = statement_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client
                    .remove_permission()
                    .function_name(&name)
                    .statement_id(&statement)
                    .send()
                    .await
                {
                    Ok(_) => Ok(PermissionRevocation::Removed),
                    Err(error)
                        if error
                            .as_service_error()
                            .map(|service_error| service_error.is_resource_not_found_exception())
                            .unwrap_or(false) =>
                    {
                        Ok(PermissionRevocation::NotFound)
                    }
                    Err(error) => Err(format!(
                        "failed to remove permission {statement} from {name}: {}",
                        DisplayErrorContext(&error)
                    )),
                }
            })
        })
    }

    fn grant_invoke_permission(&self, grant: &InvokePermissionGrant) -> Result<(), String> {
        let client = self.lambda_client.clone();
        let grant = grant.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .add_permission()
                    .function_name(&grant.function_name)
                    .statement_id(&grant.statement_id)
                    .action(&grant.action)
                    .principal(&grant.principal)
                    .source_arn(&grant.source_arn)
                    .source_account(&grant.source_account)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        format!(
                            "failed to add permission {} to {}: {}",
                            grant.statement_id,
                            grant.function_name,
                            DisplayErrorContext(&error)
                        )
                    })
            })
        })
    }
}
